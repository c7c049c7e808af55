//! # Carecoin Node - My Proof-of-Work Ledger
//!
//! This is the node behind carecoin: a UTXO ledger secured by proof-of-work,
//! kept in sync with peers over TCP. When I come back to this code, here's
//! what I need to remember:
//!
//! ## What I Built
//! - **Ledger**: blocks, regular/reward/fee transactions and a UTXO index that is
//!   always rebuilt from the blocks, never stored on its own
//! - **Consensus**: hex-leading-zero difficulty, a deterministic retarget every
//!   few blocks, forks settled by cumulative difficulty
//! - **Wallets**: password-derived Ed25519 keys, sealed with AES-256-GCM at rest
//! - **P2P Network**: JSON messages over TCP with one outbound queue per peer
//! - **Multi-Node**: every node keeps its data under `node_<port>`
//!
//! ## How I Organized My Code
//! - `core/`: blocks, transactions, proof-of-work, difficulty, the ledger and the miner
//! - `storage/`: UTXO index, pending pool, sled chain store, wallet vault
//! - `wallet/`: wallets and the operator that registers them
//! - `network/`: peer protocol, peer queues, listener, fork resolution
//! - `config/`: settings from TOML and the environment
//! - `utils/`: hashing, signatures, hex and serialization helpers
//! - `cli/`: command-line surface of the binary
//!
//! ## Key Design Decisions I Made
//! - One reader-writer lock guards blocks, pending pool and UTXO index together,
//!   so a reader never sees an index that does not match the blocks
//! - Blocks and transactions have a single canonical JSON form, checked on decode
//! - Mining works on a snapshot and simply starts over when the tip moves
//!
//! ## When I Need to Understand Something
//! 1. Start with `main.rs` to see the CLI commands
//! 2. Look at `core/blockchain.rs` for validation and chain replacement
//! 3. Check `core/transaction.rs` for how value transfers are hashed and signed
//! 4. Review `network/node.rs` for sync and fork handling
//! 5. Examine `wallet/wallet.rs` for key derivation

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Settings;
pub use core::{
    cumulative_difficulty, Block, Blockchain, ConsensusParams, DifficultyAdjustment, Miner,
    OutPoint, ProofOfWork, Transaction, TransactionKind, TxInput, TxOutput, BLOCK_REWARD,
    FEE_PER_TRANSACTION,
};
pub use error::{BlockchainError, ErrorKind, Result};
pub use network::{send_message, BlockCheck, Message, Node, Peers};
pub use storage::{KdfParams, MemoryPool, UnspentOutput, UtxoSet, WalletVault};
pub use utils::{current_timestamp, ed25519_public_key, ed25519_sign, ed25519_verify, sha256_digest};
pub use wallet::{Operator, Wallet, WalletInfo};
