// The UTXO index: every output of the accepted chain that nothing has spent yet.
// It is derived state. I never persist it, I rebuild it by replaying blocks.

use crate::core::{Block, OutPoint, Transaction, TxOutput};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// What the ledger knows about an outpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState<'a> {
    Unspent(&'a TxOutput),
    /// The output existed but a committed transaction consumed it
    Spent,
    Unknown,
}

/// Read access to spendable outputs, implemented by the ledger and by overlays on top of it
pub trait UtxoView {
    fn lookup(&self, outpoint: &OutPoint) -> OutputState<'_>;
}

/// Flat view of one unspent output, the shape queries hand out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutput {
    pub transaction_id: Uuid,
    pub output_index: u32,
    pub amount: u64,
    pub address: String,
}

impl UnspentOutput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.transaction_id, self.output_index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    outputs: HashMap<OutPoint, TxOutput>,
    by_address: HashMap<String, BTreeSet<OutPoint>>,
}

impl UtxoSet {
    pub fn new() -> UtxoSet {
        UtxoSet::default()
    }

    /// Rebuilds the index from scratch by replaying `blocks` in order
    pub fn rebuild(blocks: &[Block]) -> UtxoSet {
        let mut utxo_set = UtxoSet::new();
        for block in blocks {
            utxo_set.apply_block(block);
        }
        utxo_set
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        self.outputs.get(outpoint)
    }

    pub fn apply_block(&mut self, block: &Block) {
        for transaction in block.get_transactions() {
            self.apply_transaction(transaction);
        }
    }

    pub fn apply_transaction(&mut self, transaction: &Transaction) {
        for outpoint in transaction.spent_outpoints() {
            self.remove(&outpoint);
        }
        for (outpoint, output) in transaction.created_outpoints() {
            self.insert(outpoint, output.clone());
        }
    }

    fn insert(&mut self, outpoint: OutPoint, output: TxOutput) {
        self.by_address
            .entry(output.get_address().to_string())
            .or_default()
            .insert(outpoint);
        self.outputs.insert(outpoint, output);
    }

    fn remove(&mut self, outpoint: &OutPoint) {
        let Some(output) = self.outputs.remove(outpoint) else {
            return;
        };
        if let Some(owned) = self.by_address.get_mut(output.get_address()) {
            owned.remove(outpoint);
            if owned.is_empty() {
                self.by_address.remove(output.get_address());
            }
        }
    }

    /// Unspent outputs owned by `address`, in a stable order
    pub fn find_for_address(&self, address: &str) -> Vec<UnspentOutput> {
        let Some(owned) = self.by_address.get(address) else {
            return vec![];
        };
        owned
            .iter()
            .filter_map(|outpoint| {
                self.outputs.get(outpoint).map(|output| UnspentOutput {
                    transaction_id: outpoint.transaction_id,
                    output_index: outpoint.output_index,
                    amount: output.get_amount(),
                    address: output.get_address().to_string(),
                })
            })
            .collect()
    }

    pub fn balance(&self, address: &str) -> u64 {
        self.find_for_address(address)
            .iter()
            .fold(0u64, |acc, utxo| acc.saturating_add(utxo.amount))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Pending changes on top of a base view.
///
/// I use it to validate the transactions of one block in order: each transaction
/// may spend outputs created earlier in the same block, and nothing touches the
/// real index until the whole block is accepted.
pub struct UtxoOverlay<'a, V: UtxoView> {
    base: &'a V,
    spent: HashSet<OutPoint>,
    created: HashMap<OutPoint, TxOutput>,
}

impl<'a, V: UtxoView> UtxoOverlay<'a, V> {
    pub fn new(base: &'a V) -> Self {
        Self {
            base,
            spent: HashSet::new(),
            created: HashMap::new(),
        }
    }

    pub fn apply_transaction(&mut self, transaction: &Transaction) {
        for outpoint in transaction.spent_outpoints() {
            // An output created and consumed inside the overlay still reads as spent
            self.created.remove(&outpoint);
            self.spent.insert(outpoint);
        }
        for (outpoint, output) in transaction.created_outpoints() {
            self.created.insert(outpoint, output.clone());
        }
    }

    /// Outpoints of the base view this overlay consumed
    pub fn spent_outpoints(&self) -> &HashSet<OutPoint> {
        &self.spent
    }
}

impl<V: UtxoView> UtxoView for UtxoOverlay<'_, V> {
    fn lookup(&self, outpoint: &OutPoint) -> OutputState<'_> {
        if self.spent.contains(outpoint) {
            return OutputState::Spent;
        }
        if let Some(output) = self.created.get(outpoint) {
            return OutputState::Unspent(output);
        }
        self.base.lookup(outpoint)
    }
}
