use serde::{Deserialize, Serialize};

/// Seconds in an average 30.44-day month, the unit of lock durations.
pub const SECONDS_PER_MONTH: u64 = 2_630_016;

/// Longest supported lock, in months.
pub const MAX_LOCK_MONTHS: u32 = 60;

/// Ledger-wide configuration, fixed at setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Creation-time floor in raw token units; new stakes must strictly
    /// exceed it. Extended positions only have to stay at or above it.
    pub minimum_stake: u64,
    /// Capacity ceiling for the total working supply.
    pub staking_limit: u128,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            minimum_stake: 0,
            staking_limit: u128::MAX,
        }
    }
}
