//! Two encodings live side by side in the node:
//! bincode for private on-disk records (the wallet vault), and JSON for
//! blocks and transactions, which is the one canonical form shared by
//! storage, peers and any gateway.

use crate::error::{BlockchainError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

/// Canonical JSON encoding of a ledger entity
pub fn to_canonical_json<T: Serialize>(entity: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(entity)
        .map_err(|e| BlockchainError::Serialization(format!("JSON encoding failed: {e}")))
}

/// Decodes an entity from untrusted JSON. Structural and hash failures are both
/// reported as a malformed entity.
pub fn from_canonical_json<T>(bytes: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(bytes).map_err(|e| BlockchainError::MalformedEntity(e.to_string()))
}
