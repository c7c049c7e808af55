//! Wallet management
//!
//! Password-derived Ed25519 keys sealed at rest, and the operator that
//! registers wallets and builds signed transactions from them.

pub mod operator;
#[allow(clippy::module_inception)]
pub mod wallet;

pub use operator::{Operator, WalletInfo, DEFAULT_MIN_PASSWORD_LENGTH};
pub use wallet::{PasswordCheck, UnlockedKeys, Wallet};
