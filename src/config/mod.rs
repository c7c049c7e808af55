//! Configuration management
//!
//! Node, mining, consensus and wallet settings, read from an optional TOML
//! file and then overridden from the environment.

pub mod settings;

pub use settings::{MiningSettings, NodeSettings, Settings, WalletSettings};
