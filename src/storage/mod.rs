//! Data storage and persistence
//!
//! This module holds the UTXO index, the pending pool, the sled-backed
//! chain store and the encrypted wallet vault.

pub mod chain_store;
pub mod encrypted;
pub mod memory_pool;
pub mod utxo_set;

pub use chain_store::ChainStore;
pub use encrypted::{
    derive_key_material, Aes256GcmCipher, EncryptionResult, KdfParams, SecureKey, SecureMemory,
    WalletRecord, WalletVault, WALLET_FILE,
};
pub use memory_pool::MemoryPool;
pub use utxo_set::{OutputState, UnspentOutput, UtxoOverlay, UtxoSet, UtxoView};
