use crate::core::{OutPoint, Transaction, TxOutput};
use std::collections::HashMap;
use uuid::Uuid;

/// Pending transactions in arrival order, plus the outpoints they reserve.
/// A transaction spending another pooled one always arrives after it.
///
/// The pool lives inside the ledger state and is guarded by the same lock as
/// the blocks and the UTXO index, so it carries no lock of its own.
#[derive(Debug, Clone, Default)]
pub struct MemoryPool {
    order: Vec<Uuid>,
    transactions: HashMap<Uuid, Transaction>,
    reserved: HashMap<OutPoint, Uuid>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool::default()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    /// Adds a transaction that has already been validated. Returns false if the
    /// id is already pooled.
    pub fn add(&mut self, tx: Transaction) -> bool {
        let id = tx.get_id();
        if self.transactions.contains_key(&id) {
            return false;
        }
        for outpoint in tx.spent_outpoints() {
            self.reserved.insert(outpoint, id);
        }
        self.order.push(id);
        self.transactions.insert(id, tx);
        true
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.transactions.contains_key(id)
    }

    /// The pooled transaction already spending `outpoint`, if any
    pub fn reserved_by(&self, outpoint: &OutPoint) -> Option<Uuid> {
        self.reserved.get(outpoint).copied()
    }

    /// An output created by a pooled transaction, which a later pooled
    /// transaction may spend
    pub fn created_output(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        self.transactions
            .get(&outpoint.transaction_id)?
            .get_outputs()
            .get(outpoint.output_index as usize)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Transaction> {
        let tx = self.transactions.remove(id)?;
        for outpoint in tx.spent_outpoints() {
            self.reserved.remove(&outpoint);
        }
        self.order.retain(|pooled| pooled != id);
        Some(tx)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// All pending transactions, oldest first
    pub fn get_all(&self) -> Vec<Transaction> {
        self.order
            .iter()
            .filter_map(|id| self.transactions.get(id).cloned())
            .collect()
    }

    /// The oldest `limit` transactions
    pub fn take_oldest(&self, limit: usize) -> Vec<Transaction> {
        self.order
            .iter()
            .take(limit)
            .filter_map(|id| self.transactions.get(id).cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TransactionKind, TxInput, TxOutput};
    use crate::utils::{ed25519_public_key, ed25519_sign};

    fn pending(outpoint: OutPoint) -> Transaction {
        let from = ed25519_public_key(&[1u8; 32]).unwrap();
        let id = Uuid::new_v4();
        let inputs = vec![TxInput::unsigned(outpoint, &from)];
        let outputs = vec![TxOutput::new(4, &from)];
        let payload =
            Transaction::signing_payload(&id, TransactionKind::Regular, 1, &inputs, &outputs);
        let signature = ed25519_sign(&[1u8; 32], &payload).unwrap();
        let inputs = inputs
            .into_iter()
            .map(|input| input.with_signature(signature.clone()))
            .collect();
        Transaction::new_regular(id, inputs, outputs, 1).unwrap()
    }

    #[test]
    fn test_add_reserves_outpoints() {
        let outpoint = OutPoint::new(Uuid::new_v4(), 0);
        let tx = pending(outpoint);
        let mut pool = MemoryPool::new();

        assert!(pool.add(tx.clone()));
        assert!(!pool.add(tx.clone()));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.reserved_by(&outpoint), Some(tx.get_id()));

        pool.remove(&tx.get_id());
        assert!(pool.is_empty());
        assert_eq!(pool.reserved_by(&outpoint), None);
    }

    #[test]
    fn test_created_outputs_are_visible() {
        let mut pool = MemoryPool::new();
        let tx = pending(OutPoint::new(Uuid::new_v4(), 0));
        pool.add(tx.clone());

        let created = pool.created_output(&OutPoint::new(tx.get_id(), 0)).unwrap();
        assert_eq!(created.get_amount(), 4);
        assert!(pool.created_output(&OutPoint::new(tx.get_id(), 1)).is_none());
        assert!(pool.created_output(&OutPoint::new(Uuid::new_v4(), 0)).is_none());
    }

    #[test]
    fn test_order_is_preserved() {
        let mut pool = MemoryPool::new();
        let first = pending(OutPoint::new(Uuid::new_v4(), 0));
        let second = pending(OutPoint::new(Uuid::new_v4(), 1));
        pool.add(first.clone());
        pool.add(second.clone());

        let ids: Vec<Uuid> = pool.get_all().iter().map(Transaction::get_id).collect();
        assert_eq!(ids, vec![first.get_id(), second.get_id()]);
        assert_eq!(pool.take_oldest(1)[0].get_id(), first.get_id());
    }
}
