//! Error handling for the node
//!
//! Every core operation returns one of these variants. A gateway in front of
//! the node maps them to transport status codes through [`BlockchainError::kind`].

use std::fmt;
use uuid::Uuid;

use crate::core::OutPoint;

/// Result type alias for blockchain operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Transport-neutral classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    NotFound,
    Conflict,
    Unauthorized,
    Validation,
    Stale,
    Internal,
}

/// Why a transaction was refused by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRejection {
    Malformed(String),
    UnknownInput(OutPoint),
    DoubleSpend(OutPoint),
    InputAddressMismatch { input_index: usize },
    SignatureMismatch { input_index: usize },
    AmountMismatch { inputs: u64, outputs: u64, fee: u64 },
    FeeTooLow { fee: u64, minimum: u64 },
    DuplicateId(Uuid),
}

impl fmt::Display for TxRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxRejection::Malformed(msg) => write!(f, "malformed transaction: {msg}"),
            TxRejection::UnknownInput(outpoint) => {
                write!(f, "input {outpoint} is unknown")
            }
            TxRejection::DoubleSpend(outpoint) => {
                write!(f, "double spend: input {outpoint} is already spent")
            }
            TxRejection::InputAddressMismatch { input_index } => {
                write!(f, "input #{input_index} does not belong to its declared address")
            }
            TxRejection::SignatureMismatch { input_index } => {
                write!(f, "invalid signature on input #{input_index}")
            }
            TxRejection::AmountMismatch {
                inputs,
                outputs,
                fee,
            } => write!(
                f,
                "amount mismatch: inputs {inputs} != outputs {outputs} + fee {fee}"
            ),
            TxRejection::FeeTooLow { fee, minimum } => {
                write!(f, "fee {fee} is below the minimum of {minimum}")
            }
            TxRejection::DuplicateId(id) => write!(f, "transaction '{id}' already exists"),
        }
    }
}

/// Consensus rule a block failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRule {
    Duplicate,
    PreviousHashMismatch,
    InvalidIndex,
    InvalidDifficulty,
    InvalidHash,
    InvalidCoinbase,
    InvalidTransaction,
    InsufficientWork,
    InvalidGenesis,
    BrokenChain,
}

impl fmt::Display for BlockRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockRule::Duplicate => "duplicate block",
            BlockRule::PreviousHashMismatch => "previous hash mismatch",
            BlockRule::InvalidIndex => "invalid index",
            BlockRule::InvalidDifficulty => "invalid difficulty",
            BlockRule::InvalidHash => "invalid hash",
            BlockRule::InvalidCoinbase => "invalid coinbase",
            BlockRule::InvalidTransaction => "invalid transaction",
            BlockRule::InsufficientWork => "insufficient cumulative difficulty",
            BlockRule::InvalidGenesis => "invalid genesis block",
            BlockRule::BrokenChain => "broken hash chain",
        };
        f.write_str(text)
    }
}

/// A block refusal: the first rule violated plus a human readable detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRejection {
    pub rule: BlockRule,
    pub detail: String,
}

impl BlockRejection {
    pub fn new(rule: BlockRule, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }

    /// The tip moved under the block: it no longer extends the chain
    pub fn is_stale(&self) -> bool {
        matches!(
            self.rule,
            BlockRule::Duplicate | BlockRule::PreviousHashMismatch | BlockRule::InvalidIndex
        )
    }
}

impl fmt::Display for BlockRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule, self.detail)
    }
}

/// Comprehensive error types for node operations
#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// Structural or hash mismatch while decoding an entity
    MalformedEntity(String),
    /// The ledger refused a transaction
    TransactionAssertion(TxRejection),
    /// The ledger refused a block
    BlockAssertion(BlockRejection),
    /// Unknown wallet/address or otherwise unusable argument
    Argument(String),
    /// Insufficient funds for transaction
    InsufficientFunds { required: u64, available: u64 },
    /// Wallet password missing, wrong, or wallet still locked
    Unauthorized(String),
    /// Requested entity does not exist
    NotFound(String),
    /// The chain tip advanced while a candidate block was being mined
    StaleCandidate {
        expected_tip: String,
        current_tip: String,
    },
    /// Mining was stopped by its cancellation flag
    MiningCancelled,
    /// Database-related errors
    Storage(String),
    /// Network communication errors
    Network(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Encryption/decryption errors
    Encryption(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
}

impl BlockchainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlockchainError::MalformedEntity(_) => ErrorKind::Malformed,
            BlockchainError::TransactionAssertion(TxRejection::DuplicateId(_)) => {
                ErrorKind::Conflict
            }
            BlockchainError::TransactionAssertion(TxRejection::Malformed(_)) => {
                ErrorKind::Malformed
            }
            BlockchainError::TransactionAssertion(_) => ErrorKind::Validation,
            BlockchainError::BlockAssertion(rejection) if rejection.rule == BlockRule::Duplicate => {
                ErrorKind::Conflict
            }
            BlockchainError::BlockAssertion(_) => ErrorKind::Validation,
            BlockchainError::Argument(_) | BlockchainError::InsufficientFunds { .. } => {
                ErrorKind::Validation
            }
            BlockchainError::Unauthorized(_) => ErrorKind::Unauthorized,
            BlockchainError::NotFound(_) => ErrorKind::NotFound,
            BlockchainError::StaleCandidate { .. } | BlockchainError::MiningCancelled => {
                ErrorKind::Stale
            }
            BlockchainError::Storage(_)
            | BlockchainError::Network(_)
            | BlockchainError::Crypto(_)
            | BlockchainError::Serialization(_)
            | BlockchainError::Encryption(_)
            | BlockchainError::Config(_)
            | BlockchainError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Benign race with another block: the miner retries instead of reporting
    pub fn is_stale(&self) -> bool {
        match self {
            BlockchainError::StaleCandidate { .. } => true,
            BlockchainError::BlockAssertion(rejection) => rejection.is_stale(),
            _ => false,
        }
    }

    pub(crate) fn block(rule: BlockRule, detail: impl Into<String>) -> Self {
        BlockchainError::BlockAssertion(BlockRejection::new(rule, detail))
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::MalformedEntity(msg) => write!(f, "Malformed entity: {msg}"),
            BlockchainError::TransactionAssertion(rejection) => {
                write!(f, "Transaction rejected: {rejection}")
            }
            BlockchainError::BlockAssertion(rejection) => write!(f, "Block rejected: {rejection}"),
            BlockchainError::Argument(msg) => write!(f, "Invalid argument: {msg}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            BlockchainError::NotFound(msg) => write!(f, "Not found: {msg}"),
            BlockchainError::StaleCandidate {
                expected_tip,
                current_tip,
            } => write!(
                f,
                "Stale candidate: mined on {expected_tip} but the tip is now {current_tip}"
            ),
            BlockchainError::MiningCancelled => write!(f, "Mining cancelled"),
            BlockchainError::Storage(msg) => write!(f, "Storage error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Encryption(msg) => write!(f, "Encryption error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<TxRejection> for BlockchainError {
    fn from(rejection: TxRejection) -> Self {
        BlockchainError::TransactionAssertion(rejection)
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}
