// This is the ledger - the heart of my node
// It owns the accepted block sequence, the pending pool and the UTXO index, and it
// is the only place allowed to change any of them. All three sit behind one RwLock
// so a reader can never see an index that belongs to a different chain than the
// blocks it just read. Queries take the read side, add/replace take the write side.

use crate::core::{
    meets_difficulty, Block, ConsensusParams, DifficultyAdjustment, OutPoint, Transaction,
    TransactionKind, BLOCK_REWARD, FEE_PER_TRANSACTION,
};
use crate::error::{BlockRule, BlockchainError, Result, TxRejection};
use crate::storage::{
    ChainStore, MemoryPool, OutputState, UnspentOutput, UtxoOverlay, UtxoSet, UtxoView,
};
use crate::utils::ed25519_verify;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Everything a miner needs to build a candidate, read under one lock
#[derive(Debug, Clone)]
pub struct MiningSnapshot {
    pub tip: Block,
    pub difficulty: u32,
    pub transactions: Vec<Transaction>,
}

// The whole mutable state of the ledger. It is only ever replaced or extended
// while holding the write lock.
struct ChainState {
    blocks: Vec<Block>,
    hash_index: HashMap<String, u64>,
    // transaction id -> (block index, position inside the block)
    tx_index: HashMap<Uuid, (u64, usize)>,
    known_addresses: HashSet<String>,
    utxo: UtxoSet,
    pool: MemoryPool,
}

impl ChainState {
    fn genesis() -> ChainState {
        let genesis = Block::genesis().clone();
        let mut hash_index = HashMap::new();
        hash_index.insert(genesis.get_hash().to_string(), 0);
        ChainState {
            blocks: vec![genesis],
            hash_index,
            tx_index: HashMap::new(),
            known_addresses: HashSet::new(),
            utxo: UtxoSet::new(),
            pool: MemoryPool::new(),
        }
    }

    // The sequence always starts with genesis, so it is never empty
    fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    fn cumulative_difficulty(&self) -> u64 {
        cumulative_difficulty(&self.blocks)
    }

    fn find_committed(&self, id: &Uuid) -> Option<&Transaction> {
        let (block_index, position) = self.tx_index.get(id)?;
        self.blocks
            .get(*block_index as usize)?
            .get_transactions()
            .get(*position)
    }

    /// Validates `block` as the next block on top of the current tip.
    ///
    /// Rules are checked in a fixed order and the first failure is reported.
    /// On success the outpoints the block spends are returned.
    fn check_block(&self, block: &Block, params: &ConsensusParams) -> Result<HashSet<OutPoint>> {
        if self.hash_index.contains_key(block.get_hash()) {
            return Err(BlockchainError::block(
                BlockRule::Duplicate,
                format!("block {} is already part of the chain", block.get_hash()),
            ));
        }

        let tip = self.tip();
        if block.get_previous_hash() != tip.get_hash() {
            return Err(BlockchainError::block(
                BlockRule::PreviousHashMismatch,
                format!(
                    "block {} builds on {} but the tip is {}",
                    block.get_index(),
                    block.get_previous_hash(),
                    tip.get_hash()
                ),
            ));
        }

        if block.get_index() != tip.get_index() + 1 {
            return Err(BlockchainError::block(
                BlockRule::InvalidIndex,
                format!(
                    "expected index {} but got {}",
                    tip.get_index() + 1,
                    block.get_index()
                ),
            ));
        }

        if !block.has_valid_hash() {
            return Err(BlockchainError::block(
                BlockRule::InvalidHash,
                format!("declared hash {} does not match contents", block.get_hash()),
            ));
        }

        let expected = DifficultyAdjustment::next_difficulty(&self.blocks, params);
        if block.get_difficulty() != expected {
            return Err(BlockchainError::block(
                BlockRule::InvalidDifficulty,
                format!(
                    "block declares difficulty {} but {expected} is required",
                    block.get_difficulty()
                ),
            ));
        }
        if !meets_difficulty(block.get_hash(), expected) {
            return Err(BlockchainError::block(
                BlockRule::InvalidDifficulty,
                format!("hash {} does not meet difficulty {expected}", block.get_hash()),
            ));
        }

        self.check_block_transactions(block)
    }

    fn check_block_transactions(&self, block: &Block) -> Result<HashSet<OutPoint>> {
        let mut ids = HashSet::new();
        let mut overlay = UtxoOverlay::new(self);
        let mut fee_total: u64 = 0;
        let mut rewards = vec![];
        let mut fees = vec![];

        for tx in block.get_transactions() {
            let id = tx.get_id();
            if !ids.insert(id) || self.tx_index.contains_key(&id) {
                return Err(BlockchainError::block(
                    BlockRule::InvalidTransaction,
                    format!("duplicate transaction id '{id}'"),
                ));
            }

            match tx.get_kind() {
                TransactionKind::Reward => rewards.push(tx),
                TransactionKind::Fee => fees.push(tx),
                TransactionKind::Regular => {
                    validate_regular(tx, &overlay).map_err(|rejection| {
                        BlockchainError::block(
                            BlockRule::InvalidTransaction,
                            format!("transaction '{id}': {rejection}"),
                        )
                    })?;
                    fee_total = fee_total.checked_add(tx.get_fee()).ok_or_else(|| {
                        BlockchainError::block(BlockRule::InvalidTransaction, "fee total overflows")
                    })?;
                }
            }
            overlay.apply_transaction(tx);
        }

        match rewards.as_slice() {
            [reward] if reward.output_total() == Some(BLOCK_REWARD) => {}
            [_] => {
                return Err(BlockchainError::block(
                    BlockRule::InvalidCoinbase,
                    format!("reward transaction must pay exactly {BLOCK_REWARD}"),
                ))
            }
            found => {
                return Err(BlockchainError::block(
                    BlockRule::InvalidCoinbase,
                    format!("exactly one reward transaction required, found {}", found.len()),
                ))
            }
        }

        let fee_ok = match fees.as_slice() {
            [] => fee_total == 0,
            [fee] => fee_total > 0 && fee.output_total() == Some(fee_total),
            _ => false,
        };
        if !fee_ok {
            return Err(BlockchainError::block(
                BlockRule::InvalidCoinbase,
                format!(
                    "expected {} fee transaction collecting {fee_total}, found {}",
                    if fee_total > 0 { "one" } else { "no" },
                    fees.len()
                ),
            ));
        }

        Ok(overlay.spent_outpoints().clone())
    }

    /// Appends an already validated block and rolls the index forward
    fn commit_block(&mut self, block: Block) {
        let index = block.get_index();
        for (position, tx) in block.get_transactions().iter().enumerate() {
            self.tx_index.insert(tx.get_id(), (index, position));
            for output in tx.get_outputs() {
                self.known_addresses.insert(output.get_address().to_string());
            }
        }
        self.utxo.apply_block(&block);
        self.hash_index.insert(block.get_hash().to_string(), index);
        self.blocks.push(block);
    }

    /// Pending transactions that `block` settles: those it includes, those that
    /// spend an outpoint the block consumes, and the pooled descendants of the
    /// latter, which lose their inputs with them
    fn settled_by(&self, block: &Block, spent: &HashSet<OutPoint>) -> Vec<Uuid> {
        let included: HashSet<Uuid> = block.get_transactions().iter().map(Transaction::get_id).collect();
        let mut evicted = HashSet::new();
        let mut settled = vec![];

        // Arrival order puts parents before children, so one pass is enough
        for tx in self.pool.get_all() {
            let id = tx.get_id();
            if included.contains(&id) {
                settled.push(id);
                continue;
            }
            let conflicts = tx.spent_outpoints().any(|outpoint| {
                spent.contains(&outpoint) || evicted.contains(&outpoint.transaction_id)
            });
            if conflicts {
                evicted.insert(id);
                settled.push(id);
            }
        }
        settled
    }

    /// Checks a transaction for admission to the pending pool
    fn check_pool_admission(&self, tx: &Transaction) -> Result<()> {
        let id = tx.get_id();
        if self.pool.contains(&id) || self.tx_index.contains_key(&id) {
            return Err(TxRejection::DuplicateId(id).into());
        }
        for outpoint in tx.spent_outpoints() {
            if self.pool.reserved_by(&outpoint).is_some() {
                return Err(TxRejection::DoubleSpend(outpoint).into());
            }
        }
        validate_regular(tx, &PendingView(self))?;
        Ok(())
    }
}

// The committed index plus the outputs of pooled transactions. Pool reservations
// already keep two pending transactions from spending the same output.
struct PendingView<'a>(&'a ChainState);

impl UtxoView for PendingView<'_> {
    fn lookup(&self, outpoint: &OutPoint) -> OutputState<'_> {
        match self.0.lookup(outpoint) {
            OutputState::Unknown => match self.0.pool.created_output(outpoint) {
                Some(output) => OutputState::Unspent(output),
                None => OutputState::Unknown,
            },
            state => state,
        }
    }
}

impl UtxoView for ChainState {
    fn lookup(&self, outpoint: &OutPoint) -> OutputState<'_> {
        if let Some(output) = self.utxo.get(outpoint) {
            return OutputState::Unspent(output);
        }
        let existed = self
            .find_committed(&outpoint.transaction_id)
            .map(|tx| (outpoint.output_index as usize) < tx.get_outputs().len())
            .unwrap_or(false);
        if existed {
            OutputState::Spent
        } else {
            OutputState::Unknown
        }
    }
}

/// Validates a regular transaction against a view of spendable outputs:
/// inputs exist and are unspent, belong to the signer, carry valid signatures,
/// and `inputs == outputs + fee` with at least the minimum fee
fn validate_regular<V: UtxoView>(tx: &Transaction, view: &V) -> std::result::Result<(), TxRejection> {
    if !tx.is_regular() {
        return Err(TxRejection::Malformed(format!(
            "only regular transactions can be submitted, got {:?}",
            tx.get_kind()
        )));
    }

    let payload = tx.get_signing_payload();
    let mut seen = HashSet::new();
    let mut input_total: u64 = 0;

    for (input_index, input) in tx.get_inputs().iter().enumerate() {
        let outpoint = input.get_outpoint();
        if !seen.insert(outpoint) {
            return Err(TxRejection::DoubleSpend(outpoint));
        }

        let output = match view.lookup(&outpoint) {
            OutputState::Unspent(output) => output,
            OutputState::Spent => return Err(TxRejection::DoubleSpend(outpoint)),
            OutputState::Unknown => return Err(TxRejection::UnknownInput(outpoint)),
        };

        if !output.is_owned_by(input.get_address()) {
            return Err(TxRejection::InputAddressMismatch { input_index });
        }
        if !ed25519_verify(input.get_address(), input.get_signature(), &payload) {
            return Err(TxRejection::SignatureMismatch { input_index });
        }

        input_total = input_total
            .checked_add(output.get_amount())
            .ok_or_else(|| TxRejection::Malformed("input amounts overflow".to_string()))?;
    }

    let output_total = tx
        .output_total()
        .ok_or_else(|| TxRejection::Malformed("output amounts overflow".to_string()))?;
    let fee = tx.get_fee();
    if output_total.checked_add(fee) != Some(input_total) {
        return Err(TxRejection::AmountMismatch {
            inputs: input_total,
            outputs: output_total,
            fee,
        });
    }
    if fee < FEE_PER_TRANSACTION {
        return Err(TxRejection::FeeTooLow {
            fee,
            minimum: FEE_PER_TRANSACTION,
        });
    }

    Ok(())
}

/// Sum of the declared difficulty of every block, the fork-choice metric
pub fn cumulative_difficulty(blocks: &[Block]) -> u64 {
    blocks
        .iter()
        .map(|block| u64::from(block.get_difficulty()))
        .sum()
}

/// The ledger handle. Cloning is cheap and every clone sees the same chain.
#[derive(Clone)]
pub struct Blockchain {
    state: Arc<RwLock<ChainState>>,
    store: ChainStore,
    params: Arc<ConsensusParams>,
}

impl Blockchain {
    /// Opens (or creates) the ledger stored at `path` and replays it
    pub fn open(path: &Path, params: ConsensusParams) -> Result<Blockchain> {
        Self::with_store(ChainStore::open(path)?, params)
    }

    /// A ledger backed by a temporary database
    pub fn in_memory(params: ConsensusParams) -> Result<Blockchain> {
        Self::with_store(ChainStore::temporary()?, params)
    }

    fn with_store(store: ChainStore, params: ConsensusParams) -> Result<Blockchain> {
        params.validate()?;
        let mut state = ChainState::genesis();

        let stored = store.load_blocks()?;
        match stored.split_first() {
            None => store.append_block(Block::genesis(), &[])?,
            Some((first, rest)) => {
                if first != Block::genesis() {
                    return Err(BlockchainError::block(
                        BlockRule::InvalidGenesis,
                        "stored chain starts from a different genesis block",
                    ));
                }
                // The index is derived state, so every stored block goes through
                // full validation again
                for block in rest.iter().cloned() {
                    state.check_block(&block, &params)?;
                    state.commit_block(block);
                }
            }
        }

        let mut stale = vec![];
        for tx in store.load_pending()? {
            match state.check_pool_admission(&tx) {
                Ok(()) => {
                    state.pool.add(tx);
                }
                Err(e) => {
                    debug!("Dropping stored pending transaction {}: {e}", tx.get_id());
                    stale.push(tx.get_id());
                }
            }
        }
        store.remove_pending(&stale)?;

        info!(
            "Opened chain at height {} with {} pending transactions",
            state.tip().get_index(),
            state.pool.len()
        );

        Ok(Blockchain {
            state: Arc::new(RwLock::new(state)),
            store,
            params: Arc::new(params),
        })
    }

    // A panic while holding the lock cannot leave half-applied state behind:
    // every mutation is validated first and then applied in one go
    fn read_state(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Validates and appends a block on top of the current tip
    pub fn add_block(&self, block: Block) -> Result<Block> {
        let mut state = self.write_state();
        let spent = state.check_block(&block, &self.params)?;
        let settled = state.settled_by(&block, &spent);

        // Disk first: if the write fails, memory still matches the database
        self.store.append_block(&block, &settled)?;

        for id in &settled {
            state.pool.remove(id);
        }
        info!(
            "Accepted block {} ({}) with {} transactions, difficulty {}",
            block.get_index(),
            block.get_hash(),
            block.get_transactions().len(),
            block.get_difficulty()
        );
        state.commit_block(block.clone());
        Ok(block)
    }

    /// Validates a transaction and admits it to the pending pool
    pub fn add_transaction(&self, tx: Transaction) -> Result<Transaction> {
        let mut state = self.write_state();
        state.check_pool_admission(&tx)?;
        self.store.put_pending(&tx)?;
        info!("Accepted pending transaction {}", tx.get_id());
        state.pool.add(tx.clone());
        Ok(tx)
    }

    /// Swaps in `candidate` if it is valid from genesis and carries strictly more
    /// cumulative difficulty than the current chain.
    ///
    /// Regular transactions orphaned by the swap go back to the pending pool in
    /// chain order, followed by the current pending ones, so an orphan may spend
    /// an earlier orphan. Whatever no longer validates is dropped silently.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<()> {
        Self::verify_hash_chain(&candidate)?;
        if candidate.first() != Some(Block::genesis()) {
            return Err(BlockchainError::block(
                BlockRule::InvalidGenesis,
                "candidate chain starts from a different genesis block",
            ));
        }

        let candidate_work = cumulative_difficulty(&candidate);
        self.ensure_heavier(candidate_work)?;

        // Full validation happens without any lock held
        let mut fresh = ChainState::genesis();
        for block in candidate.into_iter().skip(1) {
            fresh.check_block(&block, &self.params)?;
            fresh.commit_block(block);
        }

        let mut state = self.write_state();
        // The local chain may have grown while I was validating
        let current_work = state.cumulative_difficulty();
        if candidate_work <= current_work {
            return Err(insufficient_work(candidate_work, current_work));
        }

        let mut returning: Vec<Transaction> = state
            .blocks
            .iter()
            .flat_map(|block| block.get_transactions())
            .filter(|tx| tx.is_regular() && !fresh.tx_index.contains_key(&tx.get_id()))
            .cloned()
            .collect();
        returning.extend(state.pool.get_all());

        let mut dropped = 0;
        for tx in returning {
            match fresh.check_pool_admission(&tx) {
                Ok(()) => {
                    fresh.pool.add(tx);
                }
                Err(e) => {
                    debug!("Dropping transaction {} after chain swap: {e}", tx.get_id());
                    dropped += 1;
                }
            }
        }

        self.store
            .replace_all(&fresh.blocks, &fresh.pool.get_all())?;

        info!(
            "Replaced chain: height {} -> {}, cumulative difficulty {current_work} -> {candidate_work}, {} pending, {dropped} dropped",
            state.tip().get_index(),
            fresh.tip().get_index(),
            fresh.pool.len()
        );
        *state = fresh;
        Ok(())
    }

    fn ensure_heavier(&self, candidate_work: u64) -> Result<()> {
        let current_work = self.read_state().cumulative_difficulty();
        if candidate_work <= current_work {
            return Err(insufficient_work(candidate_work, current_work));
        }
        Ok(())
    }

    /// Structural check of a block sequence: consecutive indexes and an unbroken
    /// hash chain
    pub fn verify_hash_chain(blocks: &[Block]) -> Result<()> {
        if blocks.is_empty() {
            return Err(BlockchainError::block(
                BlockRule::BrokenChain,
                "chain is empty",
            ));
        }
        for pair in blocks.windows(2) {
            let (previous, block) = (&pair[0], &pair[1]);
            if block.get_previous_hash() != previous.get_hash()
                || block.get_index() != previous.get_index() + 1
            {
                return Err(BlockchainError::block(
                    BlockRule::BrokenChain,
                    format!(
                        "block {} does not follow block {}",
                        block.get_index(),
                        previous.get_index()
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn get_all_blocks(&self) -> Vec<Block> {
        self.read_state().blocks.clone()
    }

    /// Blocks with index >= `from_index`
    pub fn get_blocks_from(&self, from_index: u64) -> Vec<Block> {
        let state = self.read_state();
        state
            .blocks
            .iter()
            .skip(from_index as usize)
            .cloned()
            .collect()
    }

    pub fn get_block_by_index(&self, index: u64) -> Result<Block> {
        self.read_state()
            .blocks
            .get(index as usize)
            .cloned()
            .ok_or_else(|| BlockchainError::NotFound(format!("block with index {index}")))
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Result<Block> {
        let state = self.read_state();
        state
            .hash_index
            .get(hash)
            .and_then(|index| state.blocks.get(*index as usize))
            .cloned()
            .ok_or_else(|| BlockchainError::NotFound(format!("block with hash '{hash}'")))
    }

    pub fn get_last_block(&self) -> Block {
        self.read_state().tip().clone()
    }

    pub fn contains_block(&self, hash: &str) -> bool {
        self.read_state().hash_index.contains_key(hash)
    }

    pub fn height(&self) -> u64 {
        self.read_state().tip().get_index()
    }

    pub fn tip_hash(&self) -> String {
        self.read_state().tip().get_hash().to_string()
    }

    pub fn cumulative_difficulty(&self) -> u64 {
        self.read_state().cumulative_difficulty()
    }

    /// Difficulty the next block must declare
    pub fn next_difficulty(&self) -> u32 {
        DifficultyAdjustment::next_difficulty(&self.read_state().blocks, &self.params)
    }

    /// Tip, required difficulty and the oldest `limit` pending transactions, all
    /// from the same moment
    pub fn mining_snapshot(&self, limit: usize) -> MiningSnapshot {
        let state = self.read_state();
        MiningSnapshot {
            tip: state.tip().clone(),
            difficulty: DifficultyAdjustment::next_difficulty(&state.blocks, &self.params),
            transactions: state.pool.take_oldest(limit),
        }
    }

    /// Looks in the pending pool first, then in committed blocks
    pub fn get_transaction_by_id(&self, id: &Uuid) -> Result<Transaction> {
        let state = self.read_state();
        state
            .pool
            .get(id)
            .or_else(|| state.find_committed(id))
            .cloned()
            .ok_or_else(|| BlockchainError::NotFound(format!("transaction '{id}'")))
    }

    /// Committed transactions only
    pub fn get_transaction_from_blocks(&self, id: &Uuid) -> Result<Transaction> {
        self.read_state()
            .find_committed(id)
            .cloned()
            .ok_or_else(|| BlockchainError::NotFound(format!("transaction '{id}' in blocks")))
    }

    /// The pending pool, oldest first
    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.read_state().pool.get_all()
    }

    pub fn get_unspent_transactions_for_address(&self, address: &str) -> Vec<UnspentOutput> {
        self.read_state().utxo.find_for_address(address)
    }

    /// Unspent outputs of `address` that no pending transaction has claimed yet
    pub fn get_spendable_outputs(&self, address: &str) -> Vec<UnspentOutput> {
        let state = self.read_state();
        state
            .utxo
            .find_for_address(address)
            .into_iter()
            .filter(|utxo| state.pool.reserved_by(&utxo.outpoint()).is_none())
            .collect()
    }

    /// Confirmed balance. An address that never received anything is an error,
    /// which keeps "unknown" apart from "empty".
    pub fn get_balance_for_address(&self, address: &str) -> Result<u64> {
        let state = self.read_state();
        if !state.known_addresses.contains(address) {
            return Err(BlockchainError::Argument(format!(
                "address '{address}' has no history on the chain"
            )));
        }
        Ok(state.utxo.balance(address))
    }

    /// `tip - containing block + 1` for committed transactions, 0 while pending
    pub fn get_confirmations(&self, id: &Uuid) -> Result<u64> {
        let state = self.read_state();
        if state.pool.contains(id) {
            return Ok(0);
        }
        let (block_index, _) = state
            .tx_index
            .get(id)
            .ok_or_else(|| BlockchainError::NotFound(format!("transaction '{id}'")))?;
        Ok(state.tip().get_index() - block_index + 1)
    }

    /// A copy of the current UTXO index
    pub fn utxo_snapshot(&self) -> UtxoSet {
        self.read_state().utxo.clone()
    }
}

fn insufficient_work(candidate: u64, current: u64) -> BlockchainError {
    BlockchainError::block(
        BlockRule::InsufficientWork,
        format!("candidate cumulative difficulty {candidate} does not exceed {current}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ProofOfWork, TxInput, TxOutput};
    use crate::utils::{ed25519_public_key, ed25519_sign};

    const ALICE: [u8; 32] = [1u8; 32];
    const BOB: [u8; 32] = [2u8; 32];

    fn address(seed: &[u8; 32]) -> String {
        ed25519_public_key(seed).unwrap()
    }

    fn mine_on(chain: &Blockchain, transactions: Vec<Transaction>, miner: &str) -> Block {
        let snapshot = chain.mining_snapshot(0);
        let fee_total: u64 = transactions.iter().map(Transaction::get_fee).sum();
        let mut txs = transactions;
        if fee_total > 0 {
            txs.push(Transaction::new_fee(miner, fee_total).unwrap());
        }
        txs.push(Transaction::new_reward(miner, BLOCK_REWARD).unwrap());
        let candidate = Block::from_parts(
            snapshot.tip.get_index() + 1,
            snapshot.tip.get_hash().to_string(),
            snapshot.tip.get_timestamp() + 60,
            txs,
            0,
            snapshot.difficulty,
        );
        ProofOfWork::new_proof_of_work(candidate).run(|| false).unwrap()
    }

    fn pay(seed: &[u8; 32], outpoint: OutPoint, available: u64, to: &str, amount: u64) -> Transaction {
        let from = address(seed);
        let id = Uuid::new_v4();
        let inputs = vec![TxInput::unsigned(outpoint, &from)];
        let mut outputs = vec![TxOutput::new(amount, to)];
        let change = available - amount - FEE_PER_TRANSACTION;
        if change > 0 {
            outputs.push(TxOutput::new(change, &from));
        }
        let payload = Transaction::signing_payload(
            &id,
            TransactionKind::Regular,
            FEE_PER_TRANSACTION,
            &inputs,
            &outputs,
        );
        let signature = ed25519_sign(seed, &payload).unwrap();
        let inputs = inputs
            .into_iter()
            .map(|input| input.with_signature(signature.clone()))
            .collect();
        Transaction::new_regular(id, inputs, outputs, FEE_PER_TRANSACTION).unwrap()
    }

    fn funded_chain() -> (Blockchain, OutPoint) {
        let chain = Blockchain::in_memory(ConsensusParams::fixed(1)).unwrap();
        let block = mine_on(&chain, vec![], &address(&ALICE));
        let reward = block.get_transactions()[0].get_id();
        chain.add_block(block).unwrap();
        (chain, OutPoint::new(reward, 0))
    }

    #[test]
    fn test_new_chain_has_only_genesis() {
        let chain = Blockchain::in_memory(ConsensusParams::fixed(1)).unwrap();
        assert_eq!(chain.height(), 0);
        assert_eq!(&chain.get_last_block(), Block::genesis());
        assert_eq!(chain.cumulative_difficulty(), 0);
    }

    #[test]
    fn test_rejections_name_the_rule() {
        let chain = Blockchain::in_memory(ConsensusParams::fixed(1)).unwrap();
        let good = mine_on(&chain, vec![], &address(&ALICE));

        let wrong_parent = Block::from_parts(1, "a".repeat(64), 0, vec![], 0, 1);
        let err = chain.add_block(wrong_parent).unwrap_err();
        assert!(err.to_string().contains("previous hash mismatch"));

        let wrong_index = Block::from_parts(
            2,
            good.get_previous_hash().to_string(),
            good.get_timestamp(),
            good.get_transactions().to_vec(),
            good.get_nonce(),
            1,
        );
        assert!(chain
            .add_block(wrong_index)
            .unwrap_err()
            .to_string()
            .contains("invalid index"));

        let wrong_difficulty = Block::from_parts(
            1,
            good.get_previous_hash().to_string(),
            good.get_timestamp(),
            good.get_transactions().to_vec(),
            good.get_nonce(),
            0,
        );
        assert!(chain
            .add_block(wrong_difficulty)
            .unwrap_err()
            .to_string()
            .contains("invalid difficulty"));

        let json = serde_json::to_value(&good).unwrap();
        let mut record = json.clone();
        record["hash"] = serde_json::json!("0".repeat(64));
        // Decoding refuses a forged hash before the ledger ever sees it
        assert!(serde_json::from_value::<Block>(record).is_err());

        chain.add_block(good).unwrap();
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn test_block_without_reward_is_rejected() {
        let chain = Blockchain::in_memory(ConsensusParams::fixed(1)).unwrap();
        let tip = chain.get_last_block();
        let candidate = Block::from_parts(1, tip.get_hash().to_string(), 1, vec![], 0, 1);
        let block = ProofOfWork::new_proof_of_work(candidate).run(|| false).unwrap();
        let err = chain.add_block(block).unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::BlockAssertion(ref rejection) if rejection.rule == BlockRule::InvalidCoinbase
        ));
    }

    #[test]
    fn test_pool_rejects_conflicting_spend() {
        let (chain, outpoint) = funded_chain();
        let bob = address(&BOB);

        let first = pay(&ALICE, outpoint, 50, &bob, 10);
        chain.add_transaction(first.clone()).unwrap();

        let second = pay(&ALICE, outpoint, 50, &bob, 20);
        let err = chain.add_transaction(second).unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::TransactionAssertion(TxRejection::DoubleSpend(_))
        ));

        let err = chain.add_transaction(first).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
        assert_eq!(chain.get_all_transactions().len(), 1);
    }

    #[test]
    fn test_pending_chain_is_admitted_and_mined_in_order() {
        let (chain, outpoint) = funded_chain();
        let parent = pay(&ALICE, outpoint, 50, &address(&BOB), 10);
        let child = pay(&BOB, OutPoint::new(parent.get_id(), 0), 10, &address(&ALICE), 4);

        // The child cannot come first, its input does not exist yet
        assert!(matches!(
            chain.add_transaction(child.clone()),
            Err(BlockchainError::TransactionAssertion(TxRejection::UnknownInput(_)))
        ));
        chain.add_transaction(parent.clone()).unwrap();
        chain.add_transaction(child.clone()).unwrap();

        let pending: Vec<Uuid> = chain.get_all_transactions().iter().map(Transaction::get_id).collect();
        assert_eq!(pending, vec![parent.get_id(), child.get_id()]);

        let block = mine_on(&chain, chain.get_all_transactions(), &address(&ALICE));
        chain.add_block(block).unwrap();
        assert!(chain.get_all_transactions().is_empty());
        assert_eq!(chain.get_balance_for_address(&address(&BOB)).unwrap(), 5);
    }

    #[test]
    fn test_conflicting_block_evicts_pending_descendants() {
        let (chain, outpoint) = funded_chain();
        let parent = pay(&ALICE, outpoint, 50, &address(&BOB), 10);
        let child = pay(&BOB, OutPoint::new(parent.get_id(), 0), 10, &address(&ALICE), 4);
        chain.add_transaction(parent).unwrap();
        chain.add_transaction(child).unwrap();

        // A block spends the parent's input another way
        let rival = pay(&ALICE, outpoint, 50, &address(&BOB), 30);
        let block = mine_on(&chain, vec![rival], &address(&ALICE));
        chain.add_block(block).unwrap();

        assert!(chain.get_all_transactions().is_empty());
        assert_eq!(chain.get_balance_for_address(&address(&BOB)).unwrap(), 30);
    }

    #[test]
    fn test_wrong_signer_is_rejected() {
        let (chain, outpoint) = funded_chain();
        // Bob signs for an output that belongs to Alice
        let tx = pay(&BOB, outpoint, 50, &address(&BOB), 10);
        let err = chain.add_transaction(tx).unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::TransactionAssertion(TxRejection::InputAddressMismatch { .. })
        ));
    }

    #[test]
    fn test_amount_mismatch_is_rejected() {
        let (chain, outpoint) = funded_chain();
        // Claims 60 available while the output only holds 50
        let tx = pay(&ALICE, outpoint, 60, &address(&BOB), 10);
        let err = chain.add_transaction(tx).unwrap_err();
        assert!(matches!(
            err,
            BlockchainError::TransactionAssertion(TxRejection::AmountMismatch { .. })
        ));
    }

    #[test]
    fn test_confirmations_and_lookup() {
        let (chain, outpoint) = funded_chain();
        let tx = pay(&ALICE, outpoint, 50, &address(&BOB), 10);
        let id = tx.get_id();
        chain.add_transaction(tx).unwrap();
        assert_eq!(chain.get_confirmations(&id).unwrap(), 0);
        assert!(chain.get_transaction_from_blocks(&id).is_err());

        let pending = chain.get_all_transactions();
        let block = mine_on(&chain, pending, &address(&ALICE));
        chain.add_block(block).unwrap();
        assert_eq!(chain.get_confirmations(&id).unwrap(), 1);

        let empty = mine_on(&chain, vec![], &address(&ALICE));
        chain.add_block(empty).unwrap();
        assert_eq!(chain.get_confirmations(&id).unwrap(), 2);
        assert_eq!(chain.get_transaction_by_id(&id).unwrap().get_id(), id);
        assert!(matches!(
            chain.get_confirmations(&Uuid::new_v4()),
            Err(BlockchainError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_address_balance() {
        let (chain, _) = funded_chain();
        assert_eq!(chain.get_balance_for_address(&address(&ALICE)).unwrap(), 50);
        assert!(matches!(
            chain.get_balance_for_address(&address(&BOB)),
            Err(BlockchainError::Argument(_))
        ));
    }

    #[test]
    fn test_chain_is_replayed_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let tip = {
            let chain = Blockchain::open(dir.path(), ConsensusParams::fixed(1)).unwrap();
            let block = mine_on(&chain, vec![], &address(&ALICE));
            chain.add_block(block).unwrap().get_hash().to_string()
        };

        let chain = Blockchain::open(dir.path(), ConsensusParams::fixed(1)).unwrap();
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.tip_hash(), tip);
        assert_eq!(chain.get_balance_for_address(&address(&ALICE)).unwrap(), 50);
    }

    #[test]
    fn test_verify_hash_chain() {
        let (chain, _) = funded_chain();
        let mut blocks = chain.get_all_blocks();
        assert!(Blockchain::verify_hash_chain(&blocks).is_ok());
        blocks.swap(0, 1);
        assert!(Blockchain::verify_hash_chain(&blocks).is_err());
        assert!(Blockchain::verify_hash_chain(&[]).is_err());
    }
}
