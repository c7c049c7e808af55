// The operator is the single wallet registry of a node.
// It owns every wallet, keeps the vault file in sync and builds signed
// transactions from the ledger's spendable outputs.

use crate::core::{
    Blockchain, Transaction, TransactionKind, TxInput, TxOutput, FEE_PER_TRANSACTION,
};
use crate::error::{BlockchainError, Result};
use crate::storage::{KdfParams, UnspentOutput, WalletVault};
use crate::utils::{is_lower_hex, sha256_hex, PUBLIC_KEY_HEX_LEN};
use crate::wallet::Wallet;
use log::info;
use serde::Serialize;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// The public view of a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub id: Uuid,
    pub addresses: Vec<String>,
}

impl From<&Wallet> for WalletInfo {
    fn from(wallet: &Wallet) -> Self {
        WalletInfo {
            id: wallet.get_id(),
            addresses: wallet.get_addresses().to_vec(),
        }
    }
}

pub struct Operator {
    blockchain: Blockchain,
    vault: WalletVault,
    kdf: KdfParams,
    min_password_length: usize,
    // Creation order, which is also the listing order
    wallets: RwLock<Vec<Wallet>>,
}

impl Operator {
    /// Loads every wallet from the vault. All of them start locked.
    pub fn open(
        blockchain: Blockchain,
        vault: WalletVault,
        kdf: KdfParams,
        min_password_length: usize,
    ) -> Result<Operator> {
        let wallets = vault
            .load()?
            .into_iter()
            .map(Wallet::from_record)
            .collect::<Result<Vec<_>>>()?;

        Ok(Operator {
            blockchain,
            vault,
            kdf,
            min_password_length,
            wallets: RwLock::new(wallets),
        })
    }

    /// Turns a raw password into the material the operator works with.
    /// Raw passwords never go any further than this.
    pub fn hash_password(&self, password: &str) -> Result<String> {
        if password.chars().count() < self.min_password_length {
            return Err(BlockchainError::Argument(format!(
                "Password must contain at least {} characters",
                self.min_password_length
            )));
        }
        Ok(sha256_hex(password.as_bytes()))
    }

    pub fn create_wallet_from_password(&self, password_material: &str) -> Result<WalletInfo> {
        if password_material.is_empty() {
            return Err(BlockchainError::Argument(
                "Password material must not be empty".to_string(),
            ));
        }

        let wallet = Wallet::create(password_material, self.kdf)?;
        let created = WalletInfo::from(&wallet);

        let mut wallets = self.write_wallets();
        wallets.push(wallet);
        self.persist(&wallets)?;

        info!("Created wallet {}", created.id);
        Ok(created)
    }

    pub fn get_wallets(&self) -> Vec<WalletInfo> {
        self.read_wallets().iter().map(WalletInfo::from).collect()
    }

    pub fn get_wallet_by_id(&self, wallet_id: &Uuid) -> Result<WalletInfo> {
        self.read_wallets()
            .iter()
            .find(|w| w.get_id() == *wallet_id)
            .map(WalletInfo::from)
            .ok_or_else(|| BlockchainError::NotFound(format!("wallet '{wallet_id}'")))
    }

    /// Compares the password material against the stored verifier in constant
    /// time. A match also unlocks the wallet's keys.
    ///
    /// The key derivation is slow on purpose, so it runs on a copy with no lock held.
    pub fn check_wallet_password(&self, wallet_id: &Uuid, password_material: &str) -> Result<bool> {
        let check = self
            .read_wallets()
            .iter()
            .find(|w| w.get_id() == *wallet_id)
            .map(Wallet::password_check)
            .ok_or_else(|| unknown_wallet(wallet_id))?;

        let Some(keys) = check.open(password_material)? else {
            return Ok(false);
        };

        let mut wallets = self.write_wallets();
        find_mut(&mut wallets, wallet_id)?.install_keys(keys);
        Ok(true)
    }

    pub fn get_addresses_for_wallet(&self, wallet_id: &Uuid) -> Result<Vec<String>> {
        let wallets = self.read_wallets();
        wallets
            .iter()
            .find(|w| w.get_id() == *wallet_id)
            .map(|w| w.get_addresses().to_vec())
            .ok_or_else(|| unknown_wallet(wallet_id))
    }

    /// Needs a successful [`Operator::check_wallet_password`] first
    pub fn generate_address_for_wallet(&self, wallet_id: &Uuid) -> Result<String> {
        let mut wallets = self.write_wallets();
        let address = find_mut(&mut wallets, wallet_id)?.generate_address()?;
        self.persist(&wallets)?;

        info!("Generated address {address} for wallet {wallet_id}");
        Ok(address)
    }

    /// Builds and signs a payment from `from_address`. The result still has to be
    /// submitted to the ledger.
    ///
    /// Inputs are picked largest first until they cover `amount` plus the fee.
    /// The surplus goes to `change_address`, or back to `from_address` when none is given.
    pub fn create_transaction(
        &self,
        wallet_id: &Uuid,
        from_address: &str,
        to_address: &str,
        amount: u64,
        change_address: Option<&str>,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Argument(
                "Amount must be positive".to_string(),
            ));
        }
        check_address(to_address)?;
        let change_address = change_address.unwrap_or(from_address);
        check_address(change_address)?;

        let wallets = self.read_wallets();
        let wallet = wallets
            .iter()
            .find(|w| w.get_id() == *wallet_id)
            .ok_or_else(|| unknown_wallet(wallet_id))?;
        if !wallet.owns(from_address) {
            return Err(BlockchainError::Argument(format!(
                "Address {from_address} does not belong to wallet {wallet_id}"
            )));
        }

        let required = amount.checked_add(FEE_PER_TRANSACTION).ok_or_else(|| {
            BlockchainError::Argument("Amount is too large".to_string())
        })?;
        let (selected, selected_total) =
            select_outputs(self.blockchain.get_spendable_outputs(from_address), required)?;

        let id = Uuid::new_v4();
        let inputs: Vec<TxInput> = selected
            .iter()
            .map(|utxo| TxInput::unsigned(utxo.outpoint(), from_address))
            .collect();
        let mut outputs = vec![TxOutput::new(amount, to_address)];
        let change = selected_total - required;
        if change > 0 {
            outputs.push(TxOutput::new(change, change_address));
        }

        let payload = Transaction::signing_payload(
            &id,
            TransactionKind::Regular,
            FEE_PER_TRANSACTION,
            &inputs,
            &outputs,
        );
        let signature = wallet.sign(from_address, &payload)?;
        let inputs = inputs
            .into_iter()
            .map(|input| input.with_signature(signature.clone()))
            .collect();

        Transaction::new_regular(id, inputs, outputs, FEE_PER_TRANSACTION)
    }

    pub fn get_balance_for_address(&self, address: &str) -> Result<u64> {
        self.blockchain.get_balance_for_address(address)
    }

    fn persist(&self, wallets: &[Wallet]) -> Result<()> {
        let records: Vec<_> = wallets.iter().map(Wallet::to_record).collect();
        self.vault.save(&records)
    }

    fn read_wallets(&self) -> RwLockReadGuard<'_, Vec<Wallet>> {
        self.wallets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_wallets(&self) -> RwLockWriteGuard<'_, Vec<Wallet>> {
        self.wallets.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn find_mut<'a>(wallets: &'a mut [Wallet], wallet_id: &Uuid) -> Result<&'a mut Wallet> {
    wallets
        .iter_mut()
        .find(|w| w.get_id() == *wallet_id)
        .ok_or_else(|| unknown_wallet(wallet_id))
}

fn unknown_wallet(wallet_id: &Uuid) -> BlockchainError {
    BlockchainError::Argument(format!("Wallet '{wallet_id}' not found"))
}

fn check_address(address: &str) -> Result<()> {
    if is_lower_hex(address, PUBLIC_KEY_HEX_LEN) {
        Ok(())
    } else {
        Err(BlockchainError::Argument(format!("Invalid address: {address}")))
    }
}

// Largest outputs first keeps the input count small
fn select_outputs(mut candidates: Vec<UnspentOutput>, required: u64) -> Result<(Vec<UnspentOutput>, u64)> {
    candidates.sort_by(|a, b| b.amount.cmp(&a.amount));

    let mut selected = vec![];
    let mut total: u64 = 0;
    for utxo in candidates {
        if total >= required {
            break;
        }
        total = total.saturating_add(utxo.amount);
        selected.push(utxo);
    }

    if total < required {
        return Err(BlockchainError::InsufficientFunds {
            required,
            available: total,
        });
    }
    Ok((selected, total))
}
