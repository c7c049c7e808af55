use crate::core::{ConsensusParams, DEFAULT_MAX_BLOCK_TRANSACTIONS};
use crate::error::{BlockchainError, Result};
use crate::storage::KdfParams;
use crate::wallet::DEFAULT_MIN_PASSWORD_LENGTH;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_MAX_PEERS: usize = 8;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const NODE_DATA_DIR_KEY: &str = "NODE_DATA_DIR";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub listen_address: String,
    pub bootstrap_peers: Vec<String>,
    pub data_dir: PathBuf,
    pub max_peers: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_NODE_ADDR.to_string(),
            bootstrap_peers: vec![],
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_peers: DEFAULT_MAX_PEERS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MiningSettings {
    pub reward_address: Option<String>,
    /// Falls back to the reward address
    pub fee_address: Option<String>,
    pub auto_mine: bool,
    pub poll_interval_ms: u64,
    pub max_block_transactions: usize,
}

impl Default for MiningSettings {
    fn default() -> Self {
        Self {
            reward_address: None,
            fee_address: None,
            auto_mine: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_block_transactions: DEFAULT_MAX_BLOCK_TRANSACTIONS,
        }
    }
}

impl MiningSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub min_password_length: usize,
}

impl Default for WalletSettings {
    fn default() -> Self {
        let kdf = KdfParams::default();
        Self {
            argon2_memory_kib: kdf.memory_kib,
            argon2_iterations: kdf.iterations,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
        }
    }
}

impl WalletSettings {
    pub fn kdf(&self) -> KdfParams {
        KdfParams {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
        }
    }
}

/// Everything a node needs at start-up. Built once in `main` and handed down.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub node: NodeSettings,
    pub mining: MiningSettings,
    pub consensus: ConsensusParams,
    pub wallet: WalletSettings,
}

impl Settings {
    /// Reads the optional TOML file, then applies environment overrides
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let mut settings = match path {
            Some(path) => {
                let contents = fs::read_to_string(path).map_err(|e| {
                    BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                Self::from_toml(&contents)?
            }
            None => Settings::default(),
        };
        settings.apply_overrides(|key| env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Settings> {
        toml::from_str(contents)
            .map_err(|e| BlockchainError::Config(format!("Invalid configuration: {e}")))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.node.listen_address = addr;
        }
        if let Some(dir) = lookup(NODE_DATA_DIR_KEY) {
            self.node.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup(MINING_ADDRESS_KEY) {
            self.mining.reward_address = Some(addr);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.consensus.validate()?;
        if self.node.max_peers == 0 {
            return Err(BlockchainError::Config(
                "node.max_peers must be at least 1".to_string(),
            ));
        }
        if self.mining.max_block_transactions == 0 {
            return Err(BlockchainError::Config(
                "mining.max_block_transactions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Port part of the listen address, used to keep nodes on one machine apart
    pub fn node_id(&self) -> String {
        match self.node.listen_address.rsplit_once(':') {
            Some((_, port)) => port.to_string(),
            None => "default".to_string(),
        }
    }

    /// `<data_dir>/node_<port>`
    pub fn node_data_dir(&self) -> PathBuf {
        self.node.data_dir.join(format!("node_{}", self.node_id()))
    }

    pub fn fee_address(&self) -> Option<&str> {
        self.mining
            .fee_address
            .as_deref()
            .or(self.mining.reward_address.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.node.listen_address, "127.0.0.1:2001");
        assert_eq!(settings.node_data_dir(), PathBuf::from("data/node_2001"));
        assert!(settings.validate().is_ok());
        assert_eq!(settings.wallet.kdf(), KdfParams::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            [node]
            listen_address = "127.0.0.1:3005"
            bootstrap_peers = ["127.0.0.1:2001"]

            [consensus]
            initial_difficulty = 2
            "#,
        )
        .unwrap();

        assert_eq!(settings.node_id(), "3005");
        assert_eq!(settings.node.bootstrap_peers, vec!["127.0.0.1:2001".to_string()]);
        assert_eq!(settings.node.max_peers, DEFAULT_MAX_PEERS);
        assert_eq!(settings.consensus.initial_difficulty, 2);
        assert_eq!(
            settings.consensus.adjustment_period,
            ConsensusParams::default().adjustment_period
        );
    }

    #[test]
    fn test_mistyped_toml_is_an_error() {
        assert!(Settings::from_toml("[node]\nmax_peers = \"many\"").is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let mut settings = Settings::default();
        settings.apply_overrides(|key| match key {
            "NODE_ADDRESS" => Some("127.0.0.1:4000".to_string()),
            "NODE_DATA_DIR" => Some("/tmp/chain".to_string()),
            "MINING_ADDRESS" => Some("ab".repeat(32)),
            _ => None,
        });

        assert_eq!(settings.node_data_dir(), PathBuf::from("/tmp/chain/node_4000"));
        assert_eq!(settings.mining.reward_address, Some("ab".repeat(32)));
        assert_eq!(settings.fee_address(), Some("ab".repeat(32).as_str()));
    }
}
