// The wallet vault: one bincode file holding every wallet of this node.
// Public parts (id, addresses) are stored as-is, secret seeds only in sealed form.

use crate::error::{BlockchainError, Result};
use crate::storage::encrypted::{EncryptionResult, KdfParams};
use crate::utils::{deserialize, serialize};
use log::info;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const WALLET_FILE: &str = "wallets.dat";

const VAULT_VERSION: u32 = 1;

/// One wallet as it sits on disk
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct WalletRecord {
    pub id: [u8; 16],
    pub salt: Vec<u8>,
    pub verifier: Vec<u8>,
    pub kdf: KdfParams,
    pub addresses: Vec<String>,
    pub sealed_seeds: Vec<EncryptionResult>,
}

#[derive(bincode::Encode, bincode::Decode)]
struct VaultFile {
    version: u32,
    wallets: Vec<WalletRecord>,
}

pub struct WalletVault {
    path: PathBuf,
}

impl WalletVault {
    pub fn new(data_dir: &Path) -> WalletVault {
        WalletVault {
            path: data_dir.join(WALLET_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored wallet, or none if the vault does not exist yet
    pub fn load(&self) -> Result<Vec<WalletRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let mut file = File::open(&self.path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let vault: VaultFile = deserialize(&contents)?;
        if vault.version != VAULT_VERSION {
            return Err(BlockchainError::Serialization(format!(
                "Unsupported wallet vault version {}",
                vault.version
            )));
        }

        info!("Loaded wallet vault with {} wallets", vault.wallets.len());
        Ok(vault.wallets)
    }

    /// Writes the whole vault to a temporary file and renames it into place, so a
    /// crash mid-write never leaves a truncated vault behind
    pub fn save(&self, wallets: &[WalletRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = serialize(&VaultFile {
            version: VAULT_VERSION,
            wallets: wallets.to_vec(),
        })?;

        let tmp_path = self.path.with_extension("dat.tmp");
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| BlockchainError::Io(format!("Failed to flush wallet vault: {e}")))?
            .sync_all()?;

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(addresses: Vec<String>) -> WalletRecord {
        WalletRecord {
            id: [7u8; 16],
            salt: vec![1u8; 16],
            verifier: vec![2u8; 32],
            kdf: KdfParams::insecure_for_tests(),
            addresses,
            sealed_seeds: vec![EncryptionResult {
                ciphertext: vec![3u8; 48],
                nonce: vec![4u8; 12],
            }],
        }
    }

    #[test]
    fn test_missing_vault_is_empty() {
        let dir = tempdir().unwrap();
        let vault = WalletVault::new(dir.path());
        assert!(vault.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let vault = WalletVault::new(dir.path());
        let wallets = vec![record(vec!["ab".repeat(32)])];

        vault.save(&wallets).unwrap();
        assert_eq!(vault.load().unwrap(), wallets);

        // Saving again replaces the previous contents
        vault.save(&[]).unwrap();
        assert!(vault.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_vault_is_an_error() {
        let dir = tempdir().unwrap();
        let vault = WalletVault::new(dir.path());
        fs::write(vault.path(), [0xFF, 0xFF, 0xFF]).unwrap();
        assert!(vault.load().is_err());
    }
}
