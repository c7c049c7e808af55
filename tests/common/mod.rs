// Helpers shared by the integration tests
#![allow(dead_code)]

use carecoin::{
    ed25519_public_key, ed25519_sign, Block, Blockchain, OutPoint, ProofOfWork, Transaction,
    TransactionKind, TxInput, TxOutput, BLOCK_REWARD, FEE_PER_TRANSACTION,
};
use uuid::Uuid;

pub const ALICE: [u8; 32] = [1u8; 32];
pub const BOB: [u8; 32] = [2u8; 32];
pub const MINER: [u8; 32] = [3u8; 32];

pub fn address(seed: &[u8; 32]) -> String {
    ed25519_public_key(seed).unwrap()
}

/// A signed payment spending `outpoint` (worth `available`) with the change going back
pub fn pay(seed: &[u8; 32], outpoint: OutPoint, available: u64, to: &str, amount: u64) -> Transaction {
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

/// Mines a block on top of `chain` with a chosen timestamp, without committing it
pub fn mine_block(chain: &Blockchain, transactions: Vec<Transaction>, miner: &str, timestamp: u64) -> Block {
    let tip = chain.get_last_block();
    let fee_total: u64 = transactions.iter().map(Transaction::get_fee).sum();
    let mut txs = transactions;
    if fee_total > 0 {
        txs.push(Transaction::new_fee(miner, fee_total).unwrap());
    }
    txs.push(Transaction::new_reward(miner, BLOCK_REWARD).unwrap());

    let candidate = Block::from_parts(
        tip.get_index() + 1,
        tip.get_hash().to_string(),
        timestamp,
        txs,
        0,
        chain.next_difficulty(),
    );
    ProofOfWork::new_proof_of_work(candidate).run(|| false).unwrap()
}

/// Mines and commits a block one minute after the tip
pub fn extend(chain: &Blockchain, transactions: Vec<Transaction>, miner: &str) -> Block {
    let timestamp = chain.get_last_block().get_timestamp() + 60;
    let block = mine_block(chain, transactions, miner, timestamp);
    chain.add_block(block).unwrap()
}

/// The reward output of a block, which always comes last
pub fn reward_outpoint(block: &Block) -> OutPoint {
    let reward = block.get_transactions().last().unwrap();
    OutPoint::new(reward.get_id(), 0)
}
