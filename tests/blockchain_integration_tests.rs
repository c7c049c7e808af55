//! Blockchain integration tests
//!
//! Drives the ledger through its public API only: payments, double spends,
//! duplicate blocks, persistence and the invariants every accepted chain keeps.

mod common;

use carecoin::core::{Miner, ProofOfWork};
use carecoin::error::{BlockRule, TxRejection};
use carecoin::{Blockchain, BlockchainError, ConsensusParams, ErrorKind, UtxoSet, BLOCK_REWARD};
use common::{address, extend, pay, reward_outpoint, ALICE, BOB, MINER};
use std::sync::atomic::AtomicBool;
use tempfile::tempdir;

fn chain() -> Blockchain {
    Blockchain::in_memory(ConsensusParams::fixed(1)).unwrap()
}

#[test]
fn test_payment_scenario_balances() {
    let chain = chain();
    let funding = extend(&chain, vec![], &address(&ALICE));
    let spent = reward_outpoint(&funding);

    let tx = pay(&ALICE, spent, BLOCK_REWARD, &address(&BOB), 10);
    chain.add_transaction(tx.clone()).unwrap();

    let miner = Miner::new(chain.clone());
    let block = miner
        .mine_and_commit(&address(&MINER), &address(&MINER), &AtomicBool::new(false))
        .unwrap();

    // Regular first, then fee, then reward
    assert_eq!(block.get_transactions().len(), 3);
    assert_eq!(block.get_transactions()[0].get_id(), tx.get_id());
    assert!(ProofOfWork::validate(&block));

    assert_eq!(chain.get_balance_for_address(&address(&BOB)).unwrap(), 10);
    assert_eq!(chain.get_balance_for_address(&address(&MINER)).unwrap(), 51);
    assert_eq!(chain.get_balance_for_address(&address(&ALICE)).unwrap(), 39);
    assert!(chain
        .get_unspent_transactions_for_address(&address(&ALICE))
        .iter()
        .all(|utxo| utxo.outpoint() != spent));
    assert!(chain.get_all_transactions().is_empty());
    assert_eq!(chain.get_confirmations(&tx.get_id()).unwrap(), 1);
}

#[test]
fn test_double_spend_of_committed_output_leaves_pool_unchanged() {
    let chain = chain();
    let funding = extend(&chain, vec![], &address(&ALICE));
    let outpoint = reward_outpoint(&funding);

    let first = pay(&ALICE, outpoint, BLOCK_REWARD, &address(&BOB), 10);
    extend(&chain, vec![first], &address(&MINER));

    // Something else waits in the pool before the replay attempt
    let bob_funding = extend(&chain, vec![], &address(&BOB));
    let pending = pay(&BOB, reward_outpoint(&bob_funding), BLOCK_REWARD, &address(&ALICE), 5);
    chain.add_transaction(pending).unwrap();
    let pool_before = chain.get_all_transactions();

    let replay = pay(&ALICE, outpoint, BLOCK_REWARD, &address(&BOB), 20);
    let err = chain.add_transaction(replay).unwrap_err();

    assert!(matches!(
        err,
        BlockchainError::TransactionAssertion(TxRejection::DoubleSpend(o)) if o == outpoint
    ));
    assert_eq!(chain.get_all_transactions(), pool_before);
}

#[test]
fn test_same_block_twice_is_accepted_once() {
    let chain = chain();
    let block = common::mine_block(&chain, vec![], &address(&MINER), 1_800_000_000);

    chain.add_block(block.clone()).unwrap();
    let err = chain.add_block(block).unwrap_err();

    assert!(matches!(
        &err,
        BlockchainError::BlockAssertion(rejection) if rejection.rule == BlockRule::Duplicate
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(chain.height(), 1);
}

#[test]
fn test_block_may_spend_outputs_created_earlier_in_it() {
    let chain = chain();
    let funding = extend(&chain, vec![], &address(&ALICE));

    let first = pay(&ALICE, reward_outpoint(&funding), BLOCK_REWARD, &address(&BOB), 10);
    let first_output = carecoin::OutPoint::new(first.get_id(), 0);
    let second = pay(&BOB, first_output, 10, &address(&ALICE), 4);
    let block = extend(&chain, vec![first, second], &address(&MINER));

    assert_eq!(block.get_transactions().len(), 4);
    assert!(chain.utxo_snapshot().get(&first_output).is_none());
    assert_eq!(chain.get_balance_for_address(&address(&BOB)).unwrap(), 5);
    assert_eq!(chain.get_balance_for_address(&address(&ALICE)).unwrap(), 39 + 4);
    assert_eq!(chain.get_balance_for_address(&address(&MINER)).unwrap(), BLOCK_REWARD + 2);
}

#[test]
fn test_block_spending_one_output_twice_is_rejected() {
    let chain = chain();
    let funding = extend(&chain, vec![], &address(&ALICE));
    let outpoint = reward_outpoint(&funding);

    let first = pay(&ALICE, outpoint, BLOCK_REWARD, &address(&BOB), 10);
    let second = pay(&ALICE, outpoint, BLOCK_REWARD, &address(&BOB), 20);
    let timestamp = funding.get_timestamp() + 60;
    let block = common::mine_block(&chain, vec![first, second], &address(&MINER), timestamp);

    let err = chain.add_block(block).unwrap_err();
    assert!(matches!(
        &err,
        BlockchainError::BlockAssertion(rejection) if rejection.rule == BlockRule::InvalidTransaction
    ));
    assert_eq!(chain.height(), 1);
    assert_eq!(chain.tip_hash(), funding.get_hash());
    assert_eq!(chain.get_balance_for_address(&address(&ALICE)).unwrap(), BLOCK_REWARD);
}

#[test]
fn test_utxo_index_matches_rebuild_and_hash_chain_holds() {
    let chain = chain();
    let mut outpoint = reward_outpoint(&extend(&chain, vec![], &address(&ALICE)));
    let mut available = BLOCK_REWARD;

    for amount in [3, 7, 11] {
        let tx = pay(&ALICE, outpoint, available, &address(&BOB), amount);
        let change_id = tx.get_id();
        available = available - amount - 1;
        extend(&chain, vec![tx], &address(&MINER));
        outpoint = carecoin::OutPoint::new(change_id, 1);
    }

    let blocks = chain.get_all_blocks();
    assert_eq!(UtxoSet::rebuild(&blocks), chain.utxo_snapshot());

    for pair in blocks.windows(2) {
        assert_eq!(pair[1].get_previous_hash(), pair[0].get_hash());
        assert!(pair[1].has_valid_hash());
    }
    assert!(Blockchain::verify_hash_chain(&blocks).is_ok());
    assert_eq!(chain.get_balance_for_address(&address(&BOB)).unwrap(), 21);
    assert_eq!(chain.get_balance_for_address(&address(&ALICE)).unwrap(), available);
}

#[test]
fn test_unknown_address_differs_from_empty() {
    let chain = chain();
    let funding = extend(&chain, vec![], &address(&ALICE));
    let tx = pay(&ALICE, reward_outpoint(&funding), BLOCK_REWARD, &address(&BOB), 49);
    extend(&chain, vec![tx], &address(&MINER));

    // Alice spent everything but is known
    assert_eq!(chain.get_balance_for_address(&address(&ALICE)).unwrap(), 0);
    assert!(matches!(
        chain.get_balance_for_address(&"ef".repeat(32)),
        Err(BlockchainError::Argument(_))
    ));
}

#[test]
fn test_ledger_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chain");
    let params = ConsensusParams::fixed(1);

    let (tip, pending_id, utxo) = {
        let chain = Blockchain::open(&path, params.clone()).unwrap();
        let funding = extend(&chain, vec![], &address(&ALICE));
        let tx = pay(&ALICE, reward_outpoint(&funding), BLOCK_REWARD, &address(&BOB), 10);
        let pending_id = tx.get_id();
        chain.add_transaction(tx).unwrap();
        (chain.tip_hash(), pending_id, chain.utxo_snapshot())
    };

    let reopened = Blockchain::open(&path, params).unwrap();
    assert_eq!(reopened.tip_hash(), tip);
    assert_eq!(reopened.utxo_snapshot(), utxo);
    assert_eq!(reopened.get_transaction_by_id(&pending_id).unwrap().get_id(), pending_id);
    assert_eq!(reopened.get_confirmations(&pending_id).unwrap(), 0);
}
