// This file implements the transaction entity - the unit of value transfer in my ledger
// I follow the UTXO model: every regular transaction consumes earlier outputs by
// (transactionId, outputIndex) and creates new ones. Reward and Fee transactions
// mint value out of nothing and therefore have no inputs.
//
// A transaction is immutable once built. Anything coming from the outside world
// (a peer, a gateway, my own database) is decoded through `TransactionRecord` so
// the declared hash is always recomputed before I hand out a `Transaction`.

use crate::error::{BlockchainError, Result};
use crate::utils::{
    is_lower_hex, sha256_hex, HASH_HEX_LEN, PUBLIC_KEY_HEX_LEN, SIGNATURE_HEX_LEN,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a spendable output: the transaction that created it and its position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutPoint {
    pub transaction_id: Uuid,
    pub output_index: u32,
}

impl OutPoint {
    pub fn new(transaction_id: Uuid, output_index: u32) -> OutPoint {
        OutPoint {
            transaction_id,
            output_index,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.output_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Regular,
    Reward,
    Fee,
}

impl TransactionKind {
    fn tag(&self) -> &'static [u8] {
        match self {
            TransactionKind::Regular => b"regular",
            TransactionKind::Reward => b"reward",
            TransactionKind::Fee => b"fee",
        }
    }
}

// An input spends one earlier output. The address is the owner's public key and the
// signature proves the owner authorised this exact transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    transaction_id: Uuid,
    output_index: u32,
    address: String,
    signature: String,
}

impl TxInput {
    /// An input that still has to be signed
    pub fn unsigned(outpoint: OutPoint, address: &str) -> TxInput {
        TxInput {
            transaction_id: outpoint.transaction_id,
            output_index: outpoint.output_index,
            address: address.to_string(),
            signature: String::new(),
        }
    }

    pub fn with_signature(mut self, signature: String) -> TxInput {
        self.signature = signature;
        self
    }

    pub fn get_outpoint(&self) -> OutPoint {
        OutPoint::new(self.transaction_id, self.output_index)
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    pub fn get_signature(&self) -> &str {
        self.signature.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    amount: u64,
    address: String,
}

impl TxOutput {
    pub fn new(amount: u64, address: &str) -> TxOutput {
        TxOutput {
            amount,
            address: address.to_string(),
        }
    }

    pub fn get_amount(&self) -> u64 {
        self.amount
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    pub fn is_owned_by(&self, address: &str) -> bool {
        self.address == address
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionData {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// A validated, immutable transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TransactionRecord")]
pub struct Transaction {
    id: Uuid,
    hash: String,
    #[serde(rename = "type")]
    kind: TransactionKind,
    data: TransactionData,
    fee: u64,
}

// The untrusted wire shape. I only turn it into a Transaction after checking it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TransactionRecord {
    id: Uuid,
    hash: String,
    #[serde(rename = "type")]
    kind: TransactionKind,
    data: TransactionData,
    #[serde(default)]
    fee: u64,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = BlockchainError;

    fn try_from(record: TransactionRecord) -> Result<Self> {
        let tx = Transaction {
            id: record.id,
            hash: record.hash,
            kind: record.kind,
            data: record.data,
            fee: record.fee,
        };
        tx.validate_structure()?;
        Ok(tx)
    }
}

impl Transaction {
    /// Builds a regular transaction from signed inputs
    pub fn new_regular(
        id: Uuid,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        fee: u64,
    ) -> Result<Transaction> {
        Self::assemble(id, TransactionKind::Regular, inputs, outputs, fee)
    }

    /// The coinbase paying the block subsidy to the miner
    pub fn new_reward(address: &str, amount: u64) -> Result<Transaction> {
        Self::assemble(
            Uuid::new_v4(),
            TransactionKind::Reward,
            vec![],
            vec![TxOutput::new(amount, address)],
            0,
        )
    }

    /// Collects the declared fees of a block's regular transactions
    pub fn new_fee(address: &str, amount: u64) -> Result<Transaction> {
        Self::assemble(
            Uuid::new_v4(),
            TransactionKind::Fee,
            vec![],
            vec![TxOutput::new(amount, address)],
            0,
        )
    }

    fn assemble(
        id: Uuid,
        kind: TransactionKind,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        fee: u64,
    ) -> Result<Transaction> {
        let data = TransactionData { inputs, outputs };
        let hash = Self::compute_hash(&id, kind, fee, &data);
        let tx = Transaction {
            id,
            hash,
            kind,
            data,
            fee,
        };
        tx.validate_structure()?;
        Ok(tx)
    }

    /// The bytes every input signs: everything in the transaction except the signatures
    pub fn signing_payload(
        id: &Uuid,
        kind: TransactionKind,
        fee: u64,
        inputs: &[TxInput],
        outputs: &[TxOutput],
    ) -> Vec<u8> {
        let mut data_bytes = vec![];
        Self::write_fields(&mut data_bytes, id, kind, fee, inputs, outputs, false);
        data_bytes
    }

    fn compute_hash(id: &Uuid, kind: TransactionKind, fee: u64, data: &TransactionData) -> String {
        let mut data_bytes = vec![];
        Self::write_fields(
            &mut data_bytes,
            id,
            kind,
            fee,
            &data.inputs,
            &data.outputs,
            true,
        );
        sha256_hex(&data_bytes)
    }

    // I length-prefix every variable part so two different transactions can never
    // serialize to the same byte string
    fn write_fields(
        data_bytes: &mut Vec<u8>,
        id: &Uuid,
        kind: TransactionKind,
        fee: u64,
        inputs: &[TxInput],
        outputs: &[TxOutput],
        with_signatures: bool,
    ) {
        data_bytes.extend(id.as_bytes());
        data_bytes.extend(kind.tag());
        data_bytes.extend(fee.to_be_bytes());
        data_bytes.extend((inputs.len() as u32).to_be_bytes());
        for input in inputs {
            data_bytes.extend(input.transaction_id.as_bytes());
            data_bytes.extend(input.output_index.to_be_bytes());
            write_str(data_bytes, &input.address);
            if with_signatures {
                write_str(data_bytes, &input.signature);
            }
        }
        data_bytes.extend((outputs.len() as u32).to_be_bytes());
        for output in outputs {
            data_bytes.extend(output.amount.to_be_bytes());
            write_str(data_bytes, &output.address);
        }
    }

    /// Checks everything that can be checked without the ledger: field formats,
    /// the shape required by the kind, and the declared hash
    pub fn validate_structure(&self) -> Result<()> {
        if !is_lower_hex(&self.hash, HASH_HEX_LEN) {
            return Err(malformed(self.id, "hash must be 64 lowercase hex characters"));
        }

        match self.kind {
            TransactionKind::Regular => {
                if self.data.inputs.is_empty() {
                    return Err(malformed(self.id, "regular transaction without inputs"));
                }
                if self.data.outputs.is_empty() {
                    return Err(malformed(self.id, "regular transaction without outputs"));
                }
            }
            TransactionKind::Reward | TransactionKind::Fee => {
                if !self.data.inputs.is_empty() {
                    return Err(malformed(self.id, "minting transaction with inputs"));
                }
                if self.data.outputs.len() != 1 {
                    return Err(malformed(self.id, "minting transaction needs exactly one output"));
                }
                if self.fee != 0 {
                    return Err(malformed(self.id, "minting transaction declares a fee"));
                }
            }
        }

        for (index, input) in self.data.inputs.iter().enumerate() {
            if !is_lower_hex(&input.address, PUBLIC_KEY_HEX_LEN) {
                return Err(malformed(self.id, &format!("input #{index} has a bad address")));
            }
            if !is_lower_hex(&input.signature, SIGNATURE_HEX_LEN) {
                return Err(malformed(self.id, &format!("input #{index} has a bad signature")));
            }
        }

        for (index, output) in self.data.outputs.iter().enumerate() {
            if output.amount == 0 {
                return Err(malformed(self.id, &format!("output #{index} has zero amount")));
            }
            if !is_lower_hex(&output.address, PUBLIC_KEY_HEX_LEN) {
                return Err(malformed(self.id, &format!("output #{index} has a bad address")));
            }
        }

        let expected = Self::compute_hash(&self.id, self.kind, self.fee, &self.data);
        if expected != self.hash {
            return Err(malformed(self.id, "hash does not match contents"));
        }

        Ok(())
    }

    /// The payload this transaction's inputs were signed over
    pub fn get_signing_payload(&self) -> Vec<u8> {
        Self::signing_payload(
            &self.id,
            self.kind,
            self.fee,
            &self.data.inputs,
            &self.data.outputs,
        )
    }

    pub fn get_id(&self) -> Uuid {
        self.id
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn get_fee(&self) -> u64 {
        self.fee
    }

    pub fn get_inputs(&self) -> &[TxInput] {
        self.data.inputs.as_slice()
    }

    pub fn get_outputs(&self) -> &[TxOutput] {
        self.data.outputs.as_slice()
    }

    pub fn is_regular(&self) -> bool {
        self.kind == TransactionKind::Regular
    }

    /// Sum of output amounts, `None` on overflow
    pub fn output_total(&self) -> Option<u64> {
        self.data
            .outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }

    /// Every outpoint this transaction creates
    pub fn created_outpoints(&self) -> impl Iterator<Item = (OutPoint, &TxOutput)> {
        let id = self.id;
        self.data
            .outputs
            .iter()
            .enumerate()
            .map(move |(index, output)| (OutPoint::new(id, index as u32), output))
    }

    /// Every outpoint this transaction spends
    pub fn spent_outpoints(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.data.inputs.iter().map(TxInput::get_outpoint)
    }
}

fn write_str(data_bytes: &mut Vec<u8>, value: &str) {
    data_bytes.extend((value.len() as u32).to_be_bytes());
    data_bytes.extend(value.as_bytes());
}

fn malformed(id: Uuid, reason: &str) -> BlockchainError {
    BlockchainError::MalformedEntity(format!("transaction '{id}': {reason}"))
}
