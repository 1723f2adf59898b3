//! Aggregate working-supply accounting.

use stakelock_domain::LedgerError;
use tracing::debug;

/// Maintains the total working supply and the capacity ceiling.
///
/// Every aggregate mutation in the ledger funnels through
/// [`apply_delta`](Self::apply_delta), keeping the invariant auditable
/// in one place. The limit only gates growth: unstake and transfer-out
/// deltas are negative and never checked against it.
#[derive(Debug)]
pub struct SupplyAccountant {
    total: u128,
    limit: u128,
}

impl SupplyAccountant {
    #[must_use]
    pub fn new(limit: u128) -> Self {
        Self { total: 0, limit }
    }

    /// Current total working supply.
    #[must_use]
    pub fn total(&self) -> u128 {
        self.total
    }

    /// Configured capacity ceiling.
    #[must_use]
    pub fn limit(&self) -> u128 {
        self.limit
    }

    /// Read-only growth pre-check. Growth paths must evaluate this
    /// before any state mutation in the same operation.
    #[must_use]
    pub fn check_capacity(&self, prospective_delta: u128) -> bool {
        match self.total.checked_add(prospective_delta) {
            Some(prospective) => prospective <= self.limit,
            None => false,
        }
    }

    /// Applies a signed weight delta with checked arithmetic, failing
    /// fast instead of wrapping.
    pub fn apply_delta(&mut self, delta: i128) -> Result<(), LedgerError> {
        let updated = if delta >= 0 {
            self.total.checked_add(delta.unsigned_abs())
        } else {
            self.total.checked_sub(delta.unsigned_abs())
        }
        .ok_or(LedgerError::SupplyOverflow)?;

        self.total = updated;
        debug!(total = self.total, delta, "working supply updated");
        Ok(())
    }
}
