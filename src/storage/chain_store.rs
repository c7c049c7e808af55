// Durable state of the ledger: the block sequence and the pending pool.
// Both live in one sled database so a block append and the matching pool cleanup
// commit together. The UTXO index is never written here, it is rebuilt on open.

use crate::core::{Block, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{from_canonical_json, to_canonical_json};
use log::warn;
use sled::transaction::{TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;
use uuid::Uuid;

const BLOCKS_TREE: &str = "blocks"; // big-endian index -> block JSON
const PENDING_TREE: &str = "pending"; // uuid bytes -> arrival sequence (u64 BE) ++ transaction JSON
const SEQUENCE_LEN: usize = 8;

#[derive(Clone)]
pub struct ChainStore {
    db: Db,
    blocks: Tree,
    pending: Tree,
}

impl ChainStore {
    pub fn open(path: &Path) -> Result<ChainStore> {
        let db = sled::open(path)
            .map_err(|e| BlockchainError::Storage(format!("Failed to open database: {e}")))?;
        Self::from_db(db)
    }

    /// A throw-away database, removed when the last handle drops
    pub fn temporary() -> Result<ChainStore> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| BlockchainError::Storage(format!("Failed to open database: {e}")))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<ChainStore> {
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Storage(format!("Failed to open blocks tree: {e}")))?;
        let pending = db
            .open_tree(PENDING_TREE)
            .map_err(|e| BlockchainError::Storage(format!("Failed to open pending tree: {e}")))?;
        Ok(ChainStore {
            db,
            blocks,
            pending,
        })
    }

    /// Every stored block in index order
    pub fn load_blocks(&self) -> Result<Vec<Block>> {
        let mut blocks = vec![];
        for item in self.blocks.iter() {
            let (_, value) = item?;
            blocks.push(from_canonical_json::<Block>(&value)?);
        }
        Ok(blocks)
    }

    /// Every stored pending transaction in arrival order. Records that no longer
    /// decode are skipped with a warning.
    pub fn load_pending(&self) -> Result<Vec<Transaction>> {
        let mut records = vec![];
        for item in self.pending.iter() {
            let (key, value) = item?;
            if value.len() < SEQUENCE_LEN {
                warn!("Skipping truncated pending record {key:?}");
                continue;
            }
            let (sequence, json) = value.split_at(SEQUENCE_LEN);
            let mut sequence_bytes = [0u8; SEQUENCE_LEN];
            sequence_bytes.copy_from_slice(sequence);
            match from_canonical_json::<Transaction>(json) {
                Ok(tx) => records.push((u64::from_be_bytes(sequence_bytes), tx)),
                Err(e) => warn!("Skipping unreadable pending record {key:?}: {e}"),
            }
        }
        records.sort_by_key(|(sequence, _)| *sequence);
        Ok(records.into_iter().map(|(_, tx)| tx).collect())
    }

    /// Appends a block and drops the given pending transactions in one step
    pub fn append_block(&self, block: &Block, settled: &[Uuid]) -> Result<()> {
        let key = block.get_index().to_be_bytes();
        let value = to_canonical_json(block)?;

        (&self.blocks, &self.pending)
            .transaction(|(blocks, pending)| {
                blocks.insert(&key[..], value.as_slice())?;
                for id in settled {
                    pending.remove(&id.as_bytes()[..])?;
                }
                Ok(())
            })
            .map_err(|e: TransactionError| {
                BlockchainError::Storage(format!("Failed to append block: {e}"))
            })?;

        self.db.flush()?;
        Ok(())
    }

    pub fn put_pending(&self, tx: &Transaction) -> Result<()> {
        let value = self.pending_record(tx)?;
        self.pending.insert(tx.get_id().as_bytes(), value)?;
        Ok(())
    }

    // sled ids only ever grow, also across restarts
    fn pending_record(&self, tx: &Transaction) -> Result<Vec<u8>> {
        let mut record = self.db.generate_id()?.to_be_bytes().to_vec();
        record.extend_from_slice(&to_canonical_json(tx)?);
        Ok(record)
    }

    pub fn remove_pending(&self, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            self.pending.remove(id.as_bytes())?;
        }
        Ok(())
    }

    /// Rewrites both trees after a chain replacement
    pub fn replace_all(&self, blocks: &[Block], pending: &[Transaction]) -> Result<()> {
        let mut block_records = Vec::with_capacity(blocks.len());
        for block in blocks {
            block_records.push((block.get_index().to_be_bytes(), to_canonical_json(block)?));
        }
        let mut pending_records = Vec::with_capacity(pending.len());
        for tx in pending {
            pending_records.push((*tx.get_id().as_bytes(), self.pending_record(tx)?));
        }

        // sled transactions cannot iterate, so I collect the stale keys up front.
        // The ledger write lock keeps anyone else from writing meanwhile.
        let stale_blocks = self.stored_keys(&self.blocks)?;
        let stale_pending = self.stored_keys(&self.pending)?;

        (&self.blocks, &self.pending)
            .transaction(|(blocks_tx, pending_tx)| {
                for key in &stale_blocks {
                    blocks_tx.remove(key.as_slice())?;
                }
                for key in &stale_pending {
                    pending_tx.remove(key.as_slice())?;
                }
                for (key, value) in &block_records {
                    blocks_tx.insert(&key[..], value.as_slice())?;
                }
                for (key, value) in &pending_records {
                    pending_tx.insert(&key[..], value.as_slice())?;
                }
                Ok(())
            })
            .map_err(|e: TransactionError| {
                BlockchainError::Storage(format!("Failed to replace chain: {e}"))
            })?;

        self.db.flush()?;
        Ok(())
    }

    fn stored_keys(&self, tree: &Tree) -> Result<Vec<Vec<u8>>> {
        let mut keys = vec![];
        for key in tree.iter().keys() {
            keys.push(key?.to_vec());
        }
        Ok(keys)
    }
}
