use crate::core::Block;
use log::debug;

// How many nonces I try between two looks at the interrupt check
const CHECK_INTERVAL: u64 = 1024;

/// True when `hash` starts with at least `difficulty` zero hex digits
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let required = difficulty as usize;
    hash.len() >= required && hash.bytes().take(required).all(|b| b == b'0')
}

pub struct ProofOfWork {
    block: Block,
    difficulty: u32,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> ProofOfWork {
        let difficulty = block.get_difficulty();
        ProofOfWork { block, difficulty }
    }

    /// Validate proof-of-work for a block: the declared hash is genuine and meets
    /// the difficulty the block declares
    pub fn validate(block: &Block) -> bool {
        block.has_valid_hash() && meets_difficulty(block.get_hash(), block.get_difficulty())
    }

    /// Searches nonces from zero until the hash meets the difficulty.
    ///
    /// `interrupted` is polled every few thousand attempts; when it returns true
    /// the search stops and `None` comes back.
    pub fn run<F>(self, mut interrupted: F) -> Option<Block>
    where
        F: FnMut() -> bool,
    {
        let mut nonce: u64 = 0;
        loop {
            if nonce % CHECK_INTERVAL == 0 && interrupted() {
                debug!(
                    "Proof-of-work for block {} interrupted after {nonce} attempts",
                    self.block.get_index()
                );
                return None;
            }

            let hash = self.block.compute_hash(nonce);
            if meets_difficulty(&hash, self.difficulty) {
                debug!("Found nonce {nonce} for block {}: {hash}", self.block.get_index());
                return Some(self.block.sealed(nonce, hash));
            }

            nonce = nonce.checked_add(1)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(difficulty: u32) -> Block {
        Block::from_parts(
            1,
            Block::genesis().get_hash().to_string(),
            1_704_067_260,
            vec![],
            0,
            difficulty,
        )
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(meets_difficulty("00ab", 0));
        assert!(!meets_difficulty("0fab", 2));
        assert!(!meets_difficulty("00", 3));
    }

    #[test]
    fn test_run_finds_valid_block() {
        let block = ProofOfWork::new_proof_of_work(candidate(2))
            .run(|| false)
            .unwrap();
        assert!(block.get_hash().starts_with("00"));
        assert!(ProofOfWork::validate(&block));
    }

    #[test]
    fn test_run_can_be_interrupted() {
        let result = ProofOfWork::new_proof_of_work(candidate(64)).run(|| true);
        assert!(result.is_none());
    }

    #[test]
    fn test_validate_rejects_insufficient_work() {
        let block = ProofOfWork::new_proof_of_work(candidate(1))
            .run(|| false)
            .unwrap();
        let claimed_harder = Block::from_parts(
            block.get_index(),
            block.get_previous_hash().to_string(),
            block.get_timestamp(),
            vec![],
            block.get_nonce(),
            block.get_difficulty() + 40,
        );
        assert!(!ProofOfWork::validate(&claimed_harder));
    }
}
