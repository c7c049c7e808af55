use crate::core::Transaction;
use crate::error::{BlockchainError, Result};
use crate::utils::{is_lower_hex, sha256_hex, HASH_HEX_LEN};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// previousHash of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

// Every node must start from byte-identical genesis content
const GENESIS_TIMESTAMP: u64 = 1_704_067_200;

static GENESIS: Lazy<Block> =
    Lazy::new(|| Block::from_parts(0, GENESIS_PREVIOUS_HASH.to_string(), GENESIS_TIMESTAMP, vec![], 0, 0));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "BlockRecord")]
pub struct Block {
    index: u64,
    previous_hash: String,
    timestamp: u64,
    transactions: Vec<Transaction>,
    nonce: u64,
    difficulty: u32,
    hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BlockRecord {
    index: u64,
    previous_hash: String,
    timestamp: u64,
    transactions: Vec<Transaction>,
    nonce: u64,
    difficulty: u32,
    hash: String,
}

impl TryFrom<BlockRecord> for Block {
    type Error = BlockchainError;

    fn try_from(record: BlockRecord) -> Result<Self> {
        let block = Block {
            index: record.index,
            previous_hash: record.previous_hash,
            timestamp: record.timestamp,
            transactions: record.transactions,
            nonce: record.nonce,
            difficulty: record.difficulty,
            hash: record.hash,
        };
        block.validate_structure()?;
        Ok(block)
    }
}

impl Block {
    /// The fixed first block shared by every node
    pub fn genesis() -> &'static Block {
        &GENESIS
    }

    /// Builds a block and computes its hash for the given nonce
    pub fn from_parts(
        index: u64,
        previous_hash: String,
        timestamp: u64,
        transactions: Vec<Transaction>,
        nonce: u64,
        difficulty: u32,
    ) -> Block {
        let mut block = Block {
            index,
            previous_hash,
            timestamp,
            transactions,
            nonce,
            difficulty,
            hash: String::new(),
        };
        block.hash = block.compute_hash(nonce);
        block
    }

    // I keep the field order fixed here; changing it changes every hash in the chain
    pub(crate) fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.index.to_be_bytes());
        data_bytes.extend(self.previous_hash.as_bytes());
        data_bytes.extend(self.timestamp.to_be_bytes());
        data_bytes.extend((self.transactions.len() as u32).to_be_bytes());
        for transaction in &self.transactions {
            data_bytes.extend(transaction.get_hash().as_bytes());
        }
        data_bytes.extend(self.difficulty.to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes
    }

    pub fn compute_hash(&self, nonce: u64) -> String {
        sha256_hex(&self.prepare_data(nonce))
    }

    /// Returns a copy carrying the found nonce and hash
    pub(crate) fn sealed(mut self, nonce: u64, hash: String) -> Block {
        self.nonce = nonce;
        self.hash = hash;
        self
    }

    /// Format checks plus hash recomputation. Whether the block fits the chain is
    /// the ledger's decision, not the decoder's.
    pub fn validate_structure(&self) -> Result<()> {
        if !is_lower_hex(&self.hash, HASH_HEX_LEN) {
            return Err(BlockchainError::MalformedEntity(format!(
                "block {}: hash must be 64 lowercase hex characters",
                self.index
            )));
        }
        if !is_lower_hex(&self.previous_hash, HASH_HEX_LEN) {
            return Err(BlockchainError::MalformedEntity(format!(
                "block {}: previousHash must be 64 lowercase hex characters",
                self.index
            )));
        }
        if !self.has_valid_hash() {
            return Err(BlockchainError::MalformedEntity(format!(
                "block {}: hash does not match contents",
                self.index
            )));
        }
        Ok(())
    }

    pub fn has_valid_hash(&self) -> bool {
        self.compute_hash(self.nonce) == self.hash
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn is_genesis(&self) -> bool {
        self == Block::genesis()
    }
}
