use data_encoding::HEXLOWER;
use rand::RngCore;
use ring::digest::{Context, SHA256};
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};

use crate::error::{BlockchainError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length in hex characters of a SHA-256 hash
pub const HASH_HEX_LEN: usize = 64;
/// Length in hex characters of an Ed25519 public key (an address)
pub const PUBLIC_KEY_HEX_LEN: usize = 64;
/// Length in hex characters of an Ed25519 signature
pub const SIGNATURE_HEX_LEN: usize = 128;
/// Length in bytes of an Ed25519 seed
pub const SEED_LEN: usize = 32;

/// Seconds since the unix epoch
pub fn current_timestamp() -> Result<u64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?;
    Ok(duration.as_secs())
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

/// SHA-256 rendered as 64 lowercase hex characters, the form every ledger hash takes
pub fn sha256_hex(data: &[u8]) -> String {
    HEXLOWER.encode(&sha256_digest(data))
}

pub fn to_hex(data: &[u8]) -> String {
    HEXLOWER.encode(data)
}

pub fn from_hex(data: &str) -> Result<Vec<u8>> {
    HEXLOWER
        .decode(data.as_bytes())
        .map_err(|e| BlockchainError::Crypto(format!("Invalid hex encoding: {e}")))
}

/// True when `value` is exactly `len` lowercase hex characters
pub fn is_lower_hex(value: &str, len: usize) -> bool {
    value.len() == len
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

pub fn random_bytes(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Hex public key (the address) for the Ed25519 key derived from `seed`
pub fn ed25519_public_key(seed: &[u8]) -> Result<String> {
    let key_pair = key_pair_from_seed(seed)?;
    Ok(to_hex(key_pair.public_key().as_ref()))
}

/// Signs `message` with the Ed25519 key derived from `seed`, returning hex
pub fn ed25519_sign(seed: &[u8], message: &[u8]) -> Result<String> {
    let key_pair = key_pair_from_seed(seed)?;
    Ok(to_hex(key_pair.sign(message).as_ref()))
}

/// Verifies a hex signature against a hex public key. Any decoding failure is a plain `false`.
pub fn ed25519_verify(public_key_hex: &str, signature_hex: &str, message: &[u8]) -> bool {
    let (Ok(public_key), Ok(signature)) = (from_hex(public_key_hex), from_hex(signature_hex))
    else {
        return false;
    };
    UnparsedPublicKey::new(&ED25519, public_key)
        .verify(message, &signature)
        .is_ok()
}

fn key_pair_from_seed(seed: &[u8]) -> Result<Ed25519KeyPair> {
    if seed.len() != SEED_LEN {
        return Err(BlockchainError::Crypto(format!(
            "Ed25519 seed must be {SEED_LEN} bytes, got {}",
            seed.len()
        )));
    }
    Ed25519KeyPair::from_seed_unchecked(seed)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to build Ed25519 key pair: {e}")))
}
