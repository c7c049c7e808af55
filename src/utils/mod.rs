//! Utility functions and helpers
//!
//! Hashing, Ed25519 signing, hex encoding and the two serialization formats
//! used throughout the node.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    current_timestamp, ed25519_public_key, ed25519_sign, ed25519_verify, from_hex, is_lower_hex,
    random_bytes, sha256_digest, sha256_hex, to_hex, HASH_HEX_LEN, PUBLIC_KEY_HEX_LEN, SEED_LEN,
    SIGNATURE_HEX_LEN,
};

pub use serialization::{
    deserialize, from_canonical_json, serialize, to_canonical_json,
};
