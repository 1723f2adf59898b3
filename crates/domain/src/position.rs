use crate::config::SECONDS_PER_MONTH;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single lock position.
///
/// Ids are dense, assigned sequentially starting at 0, and never reused
/// after a position is closed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single lock-deposit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Locked token amount in raw units. Increases only, via extend or
    /// compound.
    pub amount: u64,
    /// Lock duration in months, in (0, 60]. Increases only, via extend.
    pub lock_months: u32,
    /// Creation timestamp in unix seconds; never changes.
    pub start_time: u64,
    /// Refreshed on every ownership change, including creation and
    /// closure. Informational only.
    pub last_transfer_time: u64,
}

impl Position {
    /// Creates a fresh record at `now`.
    #[must_use]
    pub fn new(amount: u64, lock_months: u32, now: u64) -> Self {
        Self {
            amount,
            lock_months,
            start_time: now,
            last_transfer_time: now,
        }
    }

    /// Weighted contribution to the working supply: `amount * lock_months`.
    ///
    /// Derived, never stored. The product of a `u64` amount and a
    /// duration capped at 60 months always fits `u128`.
    #[must_use]
    pub fn working_weight(&self) -> u128 {
        u128::from(self.amount) * u128::from(self.lock_months)
    }

    /// Timestamp at which the lock has fully elapsed.
    #[must_use]
    pub fn unlock_time(&self) -> u64 {
        self.start_time
            .saturating_add(u64::from(self.lock_months).saturating_mul(SECONDS_PER_MONTH))
    }

    /// Strict unlock check: a timestamp exactly at the boundary is still
    /// locked.
    #[must_use]
    pub fn is_unlocked(&self, now: u64) -> bool {
        now > self.unlock_time()
    }
}
