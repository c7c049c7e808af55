// The miner turns the pending pool into a block.
// It works on a snapshot and never holds the ledger lock while hashing. If the tip
// moves under it (a peer delivered a block first), the search stops early and the
// attempt is reported as stale so the caller can simply try again.

use crate::core::{checked_sum, Block, Blockchain, ProofOfWork, Transaction, BLOCK_REWARD};
use crate::error::{BlockchainError, Result};
use crate::utils::current_timestamp;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};

/// How many pending transactions go into one block by default
pub const DEFAULT_MAX_BLOCK_TRANSACTIONS: usize = 100;

// Stale attempts in a row before I give up and report the race
const MAX_STALE_RETRIES: usize = 5;

pub struct Miner {
    blockchain: Blockchain,
    max_block_transactions: usize,
}

impl Miner {
    pub fn new(blockchain: Blockchain) -> Miner {
        Miner {
            blockchain,
            max_block_transactions: DEFAULT_MAX_BLOCK_TRANSACTIONS,
        }
    }

    pub fn with_max_transactions(mut self, max_block_transactions: usize) -> Miner {
        self.max_block_transactions = max_block_transactions;
        self
    }

    /// Builds a candidate from the pending pool and searches for a valid nonce.
    ///
    /// Block layout: pending regular transactions in pool order, then the Fee
    /// transaction (only when fees were declared), then the Reward.
    ///
    /// Fails with `StaleCandidate` when the tip moved during the search and with
    /// `MiningCancelled` when `cancel` was raised. The mined block is returned,
    /// not committed.
    pub fn mine(&self, reward_address: &str, fee_address: &str, cancel: &AtomicBool) -> Result<Block> {
        let snapshot = self.blockchain.mining_snapshot(self.max_block_transactions);
        let expected_tip = snapshot.tip.get_hash().to_string();

        let fee_total = checked_sum(snapshot.transactions.iter().map(Transaction::get_fee))
            .ok_or_else(|| BlockchainError::Argument("pending fees overflow".to_string()))?;

        let mut transactions = snapshot.transactions;
        if fee_total > 0 {
            transactions.push(Transaction::new_fee(fee_address, fee_total)?);
        }
        transactions.push(Transaction::new_reward(reward_address, BLOCK_REWARD)?);

        let index = snapshot.tip.get_index() + 1;
        let timestamp = current_timestamp()?.max(snapshot.tip.get_timestamp());
        let candidate = Block::from_parts(
            index,
            expected_tip.clone(),
            timestamp,
            transactions,
            0,
            snapshot.difficulty,
        );

        info!(
            "Mining block {index} with {} transactions (difficulty: {})",
            candidate.get_transactions().len(),
            snapshot.difficulty
        );

        let mined = ProofOfWork::new_proof_of_work(candidate).run(|| {
            cancel.load(Ordering::SeqCst) || self.blockchain.tip_hash() != expected_tip
        });

        if cancel.load(Ordering::SeqCst) {
            return Err(BlockchainError::MiningCancelled);
        }
        let current_tip = self.blockchain.tip_hash();
        if current_tip != expected_tip {
            return Err(BlockchainError::StaleCandidate {
                expected_tip,
                current_tip,
            });
        }

        mined.ok_or(BlockchainError::MiningCancelled)
    }

    /// Mines and commits a block, starting over when another block wins the race
    pub fn mine_and_commit(
        &self,
        reward_address: &str,
        fee_address: &str,
        cancel: &AtomicBool,
    ) -> Result<Block> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = self
                .mine(reward_address, fee_address, cancel)
                .and_then(|block| self.blockchain.add_block(block));

            match outcome {
                Ok(block) => {
                    info!("Mined block {} ({})", block.get_index(), block.get_hash());
                    return Ok(block);
                }
                Err(e) if e.is_stale() && attempts < MAX_STALE_RETRIES => {
                    debug!("Candidate went stale, mining again: {e}");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
