use crate::core::{Block, ConsensusParams};
use log::info;

/// Difficulty adjustment algorithm for maintaining consistent block times
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    /// Difficulty the next block on top of `chain` must declare.
    ///
    /// `chain` starts at genesis and ends at the current tip. Blocks 1 through
    /// `adjustment_period` use the initial difficulty. After that the value is
    /// retargeted once per period from the window of the previous
    /// `adjustment_period` blocks and carried over in between. Genesis never
    /// takes part in a window.
    pub fn next_difficulty(chain: &[Block], params: &ConsensusParams) -> u32 {
        let next_index = chain.len() as u64;
        let period = params.adjustment_period.max(1);

        if next_index <= period {
            return params.initial_difficulty;
        }

        let current_difficulty = chain
            .last()
            .map(|block| block.get_difficulty())
            .unwrap_or(params.initial_difficulty);

        // Only adjust difficulty at specific intervals
        if (next_index - 1) % period != 0 {
            return current_difficulty;
        }

        let window_start = (next_index - period) as usize;
        let window = &chain[window_start..];
        if window.len() < 2 {
            return current_difficulty;
        }

        let actual_time_span = Self::calculate_time_span(window);
        let target_time_span = params.target_block_time_secs * (window.len() as u64 - 1);
        let new_difficulty = Self::adjust_difficulty(
            current_difficulty,
            actual_time_span,
            target_time_span,
            params,
        );

        if new_difficulty != current_difficulty {
            info!("Difficulty adjustment at index {next_index}: {current_difficulty} -> {new_difficulty} (actual: {actual_time_span}s, target: {target_time_span}s)");
        }

        new_difficulty
    }

    // Timestamps come from miners, so a window that runs backwards counts as zero time
    fn calculate_time_span(window: &[Block]) -> u64 {
        match (window.first(), window.last()) {
            (Some(first), Some(last)) => last.get_timestamp().saturating_sub(first.get_timestamp()),
            _ => 0,
        }
    }

    /// Adjust difficulty based on actual vs target time
    fn adjust_difficulty(
        current_difficulty: u32,
        actual_time: u64,
        target_time: u64,
        params: &ConsensusParams,
    ) -> u32 {
        let time_ratio = actual_time as f64 / target_time.max(1) as f64;

        let new_difficulty = if time_ratio < 0.5 {
            // Blocks are being mined too fast
            current_difficulty + 2
        } else if time_ratio < 0.75 {
            current_difficulty + 1
        } else if time_ratio > 2.0 {
            // Blocks are being mined too slow
            current_difficulty.saturating_sub(2)
        } else if time_ratio > 1.5 {
            current_difficulty.saturating_sub(1)
        } else {
            current_difficulty
        };

        new_difficulty.clamp(params.min_difficulty, params.max_difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConsensusParams {
        ConsensusParams {
            initial_difficulty: 4,
            min_difficulty: 1,
            max_difficulty: 12,
            adjustment_period: 10,
            target_block_time_secs: 120,
        }
    }

    // Blocks with arbitrary hashes are fine here: only timestamps and difficulty matter
    fn chain_with_interval(len: usize, interval: u64, difficulty: u32) -> Vec<Block> {
        let mut chain = vec![Block::genesis().clone()];
        for index in 1..len as u64 {
            chain.push(Block::from_parts(
                index,
                chain[index as usize - 1].get_hash().to_string(),
                1_000_000 + index * interval,
                vec![],
                0,
                difficulty,
            ));
        }
        chain
    }

    #[test]
    fn test_initial_difficulty() {
        let chain = chain_with_interval(1, 120, 0);
        assert_eq!(DifficultyAdjustment::next_difficulty(&chain, &params()), 4);

        let chain = chain_with_interval(10, 1, 4);
        assert_eq!(DifficultyAdjustment::next_difficulty(&chain, &params()), 4);
    }

    #[test]
    fn test_difficulty_adjustment_fast_blocks() {
        // Blocks 1..=10 every 10 seconds against a 120 second target
        let chain = chain_with_interval(11, 10, 4);
        assert_eq!(DifficultyAdjustment::next_difficulty(&chain, &params()), 6);
    }

    #[test]
    fn test_difficulty_adjustment_slow_blocks() {
        // Exactly 1.5x the target keeps the difficulty
        let chain = chain_with_interval(11, 180, 4);
        assert_eq!(DifficultyAdjustment::next_difficulty(&chain, &params()), 4);

        let chain = chain_with_interval(11, 300, 4);
        assert_eq!(DifficultyAdjustment::next_difficulty(&chain, &params()), 2);
    }

    #[test]
    fn test_difficulty_carries_over_between_retargets() {
        let chain = chain_with_interval(13, 10, 6);
        assert_eq!(DifficultyAdjustment::next_difficulty(&chain, &params()), 6);
    }

    #[test]
    fn test_difficulty_bounds() {
        let chain = chain_with_interval(11, 10_000, 1);
        assert_eq!(DifficultyAdjustment::next_difficulty(&chain, &params()), 1);

        let chain = chain_with_interval(11, 0, 12);
        assert_eq!(DifficultyAdjustment::next_difficulty(&chain, &params()), 12);
    }
}
