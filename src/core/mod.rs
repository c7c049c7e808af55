//! Core ledger functionality
//!
//! Blocks, transactions, proof-of-work, the difficulty policy, the ledger
//! itself and the miner that extends it.

pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod miner;
pub mod monetary;
pub mod params;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, GENESIS_PREVIOUS_HASH};
pub use blockchain::{cumulative_difficulty, Blockchain, MiningSnapshot};
pub use difficulty::DifficultyAdjustment;
pub use miner::{Miner, DEFAULT_MAX_BLOCK_TRANSACTIONS};
pub use monetary::{checked_sum, BLOCK_REWARD, FEE_PER_TRANSACTION};
pub use params::ConsensusParams;
pub use proof_of_work::{meets_difficulty, ProofOfWork};
pub use transaction::{OutPoint, Transaction, TransactionData, TransactionKind, TxInput, TxOutput};
