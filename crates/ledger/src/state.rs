//! Shared ledger state and the ownership-change bookkeeping routine.

use crate::store::PositionStore;
use crate::supply::SupplyAccountant;
use stakelock_domain::{Address, LedgerError, Position, PositionId};

/// Ledger-local state: the position arena plus the aggregate accountant.
#[derive(Debug)]
pub struct LedgerState {
    pub store: PositionStore,
    pub supply: SupplyAccountant,
}

impl LedgerState {
    #[must_use]
    pub fn new(staking_limit: u128) -> Self {
        Self {
            store: PositionStore::new(),
            supply: SupplyAccountant::new(staking_limit),
        }
    }

    /// Applies a batch ownership change to the indexes and the aggregate.
    ///
    /// One routine covers all four combinations: mint (`from` = None),
    /// plain transfer, burn (`to` = None) and self-transfer. It is the
    /// only code path that touches the owner indexes or the aggregate as
    /// a consequence of ownership movement; every lifecycle operation
    /// that moves a position calls it directly.
    ///
    /// Per id, in order: refresh `last_transfer_time`; read the working
    /// weight from the stored record before anything is cleared;
    /// subtract weight and unindex when leaving `from`; add weight and
    /// index when arriving at `to`; tombstone the record on burn so it
    /// can never be read as live again.
    ///
    /// When `from` is given it must currently own every id, repeats
    /// included: a batch that lists an id twice fails on the second
    /// pass, since the first pass already moved it. Callers validate
    /// ids up front so this only trips on a bookkeeping bug.
    pub fn apply_ownership_change(
        &mut self,
        from: Option<&Address>,
        to: Option<&Address>,
        ids: &[PositionId],
        now: u64,
    ) -> Result<(), LedgerError> {
        for &id in ids {
            let weight = {
                let position = self.store.get_mut(id)?;
                position.last_transfer_time = now;
                position.working_weight()
            };

            if let Some(from) = from {
                // Unindexing an id `from` does not hold would leave the
                // real holder's owner-of entry detached.
                if self.store.owner_of(id) != Some(from) {
                    return Err(LedgerError::NotOwner {
                        caller: from.clone(),
                        id,
                    });
                }
                self.supply.apply_delta(-(weight as i128))?;
                self.store.remove_from_owner_index(from, id);
                self.store.clear_owner(id);
            }

            if let Some(to) = to {
                self.supply.apply_delta(weight as i128)?;
                self.store.assign_owner(to, id);
            } else {
                self.store.clear(id);
            }
        }
        Ok(())
    }

    /// Sum of working weights over `owner`'s live positions.
    #[must_use]
    pub fn working_balance_of(&self, owner: &Address) -> u128 {
        self.store
            .positions_of(owner)
            .into_iter()
            .filter_map(|id| self.store.get(id).ok())
            .map(Position::working_weight)
            .sum()
    }
}
