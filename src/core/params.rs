//! Consensus parameters
//!
//! Every node on a network has to run with the same values here, otherwise
//! they disagree on which difficulty a block must declare and split the chain.

use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// Difficulty of the first blocks after genesis, in leading zero hex digits
    pub initial_difficulty: u32,
    pub min_difficulty: u32,
    pub max_difficulty: u32,
    /// Number of blocks between two retargets
    pub adjustment_period: u64,
    /// Block interval the retarget steers towards
    pub target_block_time_secs: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            initial_difficulty: 3,
            min_difficulty: 1,
            max_difficulty: 8,
            adjustment_period: 10,
            target_block_time_secs: 120,
        }
    }
}

impl ConsensusParams {
    /// Parameters that pin the difficulty to a single value. Handy for tests and
    /// private networks.
    pub fn fixed(difficulty: u32) -> Self {
        Self {
            initial_difficulty: difficulty,
            min_difficulty: difficulty,
            max_difficulty: difficulty,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.adjustment_period == 0 {
            return Err(BlockchainError::Config(
                "adjustment_period must be at least 1".to_string(),
            ));
        }
        if self.target_block_time_secs == 0 {
            return Err(BlockchainError::Config(
                "target_block_time_secs must be at least 1".to_string(),
            ));
        }
        if self.max_difficulty > 64 {
            return Err(BlockchainError::Config(
                "max_difficulty cannot exceed the 64 hex digits of a hash".to_string(),
            ));
        }
        if !(self.min_difficulty..=self.max_difficulty).contains(&self.initial_difficulty) {
            return Err(BlockchainError::Config(format!(
                "initial_difficulty {} is outside [{}, {}]",
                self.initial_difficulty, self.min_difficulty, self.max_difficulty
            )));
        }
        Ok(())
    }
}
