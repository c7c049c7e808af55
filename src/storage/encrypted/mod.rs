//! Wallet encryption
//!
//! Blockchain data is public and stays in plain JSON. Only wallet key material
//! is protected: a password-derived key (argon2id) seals every secret seed with
//! AES-256-GCM before it reaches the vault file.

pub mod cipher;
pub mod vault;

pub use cipher::{Aes256GcmCipher, EncryptionResult, SecureKey, SecureMemory};
pub use vault::{WalletRecord, WalletVault, WALLET_FILE};

use crate::error::{BlockchainError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

/// Length of the derived key material: a 32 byte storage key followed by a 32 byte root seed
pub const KEY_MATERIAL_LEN: usize = 64;

/// argon2id cost. Stored with every wallet so a later change of defaults never
/// locks anyone out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(default)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
        }
    }
}

impl KdfParams {
    /// Cheapest cost argon2 accepts, for tests only
    pub fn insecure_for_tests() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
        }
    }
}

/// Stretches password material and a salt into key material
pub fn derive_key_material(password: &[u8], salt: &[u8], kdf: &KdfParams) -> Result<SecureKey> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, 1, Some(KEY_MATERIAL_LEN))
        .map_err(|e| BlockchainError::Encryption(format!("Invalid Argon2 parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = vec![0u8; KEY_MATERIAL_LEN];
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|e| BlockchainError::Encryption(format!("Key derivation failed: {e}")))?;

    Ok(SecureKey::new(key))
}
