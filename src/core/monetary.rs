//! Monetary policy of the ledger
//!
//! Amounts are whole units with no fractional part. Every node has to agree on
//! these values because they are checked when a block is validated.

/// Subsidy paid by the Reward transaction of every mined block
pub const BLOCK_REWARD: u64 = 50;

/// Fee every regular transaction must declare at minimum. Wallets declare
/// exactly this amount.
pub const FEE_PER_TRANSACTION: u64 = 1;

/// Sums amounts, `None` on overflow
pub fn checked_sum<I>(amounts: I) -> Option<u64>
where
    I: IntoIterator<Item = u64>,
{
    amounts
        .into_iter()
        .try_fold(0u64, |acc, amount| acc.checked_add(amount))
}
