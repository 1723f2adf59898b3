//! Append-only position arena and owner indexes.

use std::collections::HashMap;
use stakelock_domain::{Address, LedgerError, Position, PositionId};
use tracing::debug;

/// Owns the append-only position collection and the owner indexes.
///
/// Ids are dense and assigned sequentially; a closed position leaves a
/// tombstone (`None`) behind and its id is never reused, so sparse holes
/// are expected and must not be misread as live records. The store does
/// no input validation; that is the caller's responsibility.
#[derive(Debug, Default)]
pub struct PositionStore {
    /// Arena indexed by id. `None` marks a closed position.
    positions: Vec<Option<Position>>,
    /// Single current owner per live position.
    owner_of: HashMap<PositionId, Address>,
    /// Live position ids per owner, in insertion order.
    owned: HashMap<Address, Vec<PositionId>>,
}

impl PositionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next [`create`](Self::create) call will assign.
    #[must_use]
    pub fn next_id(&self) -> PositionId {
        PositionId(self.positions.len() as u64)
    }

    /// Number of ids ever allocated, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of currently-live positions.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.positions.iter().filter(|slot| slot.is_some()).count()
    }

    /// Appends a record and returns its id. Ownership is recorded
    /// separately, by the ownership-change routine.
    pub fn create(&mut self, amount: u64, lock_months: u32, now: u64) -> PositionId {
        let id = self.next_id();
        self.positions
            .push(Some(Position::new(amount, lock_months, now)));
        debug!(id = %id, amount, lock_months, "position record created");
        id
    }

    /// Fails with `PositionNotFound` when the id is out of range or the
    /// record was already cleared.
    pub fn get(&self, id: PositionId) -> Result<&Position, LedgerError> {
        self.positions
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(LedgerError::PositionNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: PositionId) -> Result<&mut Position, LedgerError> {
        self.positions
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(LedgerError::PositionNotFound(id))
    }

    /// Live positions currently held by `owner`, in insertion order.
    #[must_use]
    pub fn positions_of(&self, owner: &Address) -> Vec<PositionId> {
        self.owned.get(owner).cloned().unwrap_or_default()
    }

    /// Current owner of a live position, `None` when closed or never
    /// created.
    #[must_use]
    pub fn owner_of(&self, id: PositionId) -> Option<&Address> {
        self.owner_of.get(&id)
    }

    /// Tombstones the record. The id remains permanently allocated.
    pub fn clear(&mut self, id: PositionId) {
        if let Some(slot) = self.positions.get_mut(id.0 as usize) {
            *slot = None;
            debug!(id = %id, "position record cleared");
        }
    }

    /// Removes exactly `id` from `owner`'s set. Silent when not present.
    pub fn remove_from_owner_index(&mut self, owner: &Address, id: PositionId) {
        if let Some(ids) = self.owned.get_mut(owner) {
            if let Some(index) = ids.iter().position(|&held| held == id) {
                ids.remove(index);
            }
            if ids.is_empty() {
                self.owned.remove(owner);
            }
        }
    }

    /// Records `owner` as the single holder of `id` and appends the id
    /// to the owner's set.
    pub(crate) fn assign_owner(&mut self, owner: &Address, id: PositionId) {
        self.owner_of.insert(id, owner.clone());
        self.owned.entry(owner.clone()).or_default().push(id);
    }

    /// Drops the owner-of entry for `id`.
    pub(crate) fn clear_owner(&mut self, id: PositionId) {
        self.owner_of.remove(&id);
    }
}
