//! Orchestration of the public ledger operations.

use crate::events::{
    BoostRefreshedData, CompoundedData, EventData, ExtendedData, LedgerEvent, LedgerEventType,
    StakedData, TransferredData, UnstakedData,
};
use crate::gate::AccessGate;
use crate::state::LedgerState;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stakelock_collaborators::{AllowList, BoostVault, Clock, Gatekeeper, RewardsEngine, UnderlyingToken};
use stakelock_domain::{
    Address, LedgerConfig, LedgerError, MAX_LOCK_MONTHS, Position, PositionId,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The position ledger and its collaborators.
///
/// Every public operation is all-or-nothing: inputs and authorization
/// are validated first, capacity is checked on the exact prospective
/// delta, external collaborators run next, and local state commits
/// last — so a failing collaborator call leaves the ledger exactly as
/// it was. A collaborator that calls back into the ledger mid-operation
/// is rejected with [`LedgerError::Reentrancy`].
pub struct StakingLedger {
    /// Setup-time configuration.
    config: LedgerConfig,
    /// Position arena + working-supply accountant.
    state: RwLock<LedgerState>,
    /// Committed-operation journal.
    journal: RwLock<Vec<LedgerEvent>>,
    /// Pause / allow-list pass-through.
    gate: AccessGate,
    /// External rewards engine.
    rewards: Arc<dyn RewardsEngine>,
    /// The locked underlying token.
    token: Arc<dyn UnderlyingToken>,
    /// Time source for lock accounting.
    clock: Arc<dyn Clock>,
    /// Held/not-held operation flag; nested entry is rejected.
    entered: AtomicBool,
}

/// Clears the operation flag on every exit path.
struct OpGuard<'a>(&'a AtomicBool);

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn validate_lock_months(months: u32) -> Result<(), LedgerError> {
    if months == 0 || months > MAX_LOCK_MONTHS {
        return Err(LedgerError::InvalidLockDuration {
            months,
            max: MAX_LOCK_MONTHS,
        });
    }
    Ok(())
}

impl StakingLedger {
    /// Creates a ledger wired to its external collaborators.
    pub fn new(
        config: LedgerConfig,
        rewards: Arc<dyn RewardsEngine>,
        token: Arc<dyn UnderlyingToken>,
        gatekeeper: Arc<dyn Gatekeeper>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let staking_limit = config.staking_limit;
        Self {
            config,
            state: RwLock::new(LedgerState::new(staking_limit)),
            journal: RwLock::new(Vec::new()),
            gate: AccessGate::new(gatekeeper),
            rewards,
            token,
            clock,
            entered: AtomicBool::new(false),
        }
    }

    /// Configures the optional allow-list before the ledger is shared.
    /// No list means unrestricted access.
    pub fn set_allow_list(&mut self, allow_list: Arc<dyn AllowList>) {
        self.gate.set_allow_list(allow_list);
    }

    fn enter(&self) -> Result<OpGuard<'_>, LedgerError> {
        if self
            .entered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LedgerError::Reentrancy);
        }
        Ok(OpGuard(&self.entered))
    }

    async fn record(&self, event_type: LedgerEventType, data: EventData) {
        self.journal
            .write()
            .await
            .push(LedgerEvent::new(event_type, data));
    }

    /// Locks `amount` for `lock_months` and creates a position owned by
    /// `recipient`. Returns the assigned id.
    pub async fn stake(
        &self,
        caller: &Address,
        recipient: &Address,
        amount: u64,
        lock_months: u32,
    ) -> Result<PositionId, LedgerError> {
        let _guard = self.enter()?;
        self.gate.ensure_not_paused().await?;
        if recipient.is_null() {
            return Err(LedgerError::NullRecipient);
        }
        self.gate.ensure_can_receive(recipient).await?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        // Strict at creation; extend only keeps the total at or above.
        if amount <= self.config.minimum_stake {
            return Err(LedgerError::AmountBelowMinimum {
                amount,
                minimum: self.config.minimum_stake,
            });
        }
        validate_lock_months(lock_months)?;

        let available = self.token.balance_of(caller).await?;
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                required: amount,
            });
        }

        let weight = u128::from(amount) * u128::from(lock_months);
        let id = {
            let state = self.state.read().await;
            if !state.supply.check_capacity(weight) {
                return Err(LedgerError::CapacityExceeded {
                    prospective: state.supply.total().saturating_add(weight),
                    limit: state.supply.limit(),
                });
            }
            state.store.next_id()
        };

        // Checkpoint the id with the rewards engine before the record
        // goes live.
        self.rewards.calculate_staking_rewards(id).await?;
        self.token.transfer_from(caller, amount).await?;

        let now = self.clock.now();
        {
            let mut state = self.state.write().await;
            let created = state.store.create(amount, lock_months, now);
            debug_assert_eq!(created, id);
            state.apply_ownership_change(None, Some(recipient), &[id], now)?;
        }

        self.record(
            LedgerEventType::Staked,
            EventData::Staked(StakedData {
                id,
                owner: recipient.clone(),
                amount,
                lock_months,
            }),
        )
        .await;
        info!(id = %id, owner = %recipient, amount, lock_months, "stake created");
        Ok(id)
    }

    /// Increases a position's amount and/or duration in place. At least
    /// one of the two must grow; the total duration stays within the
    /// 60-month cap.
    pub async fn extend(
        &self,
        caller: &Address,
        id: PositionId,
        additional_amount: u64,
        additional_months: u32,
    ) -> Result<(), LedgerError> {
        let _guard = self.enter()?;
        self.gate.ensure_not_paused().await?;
        if additional_amount == 0 && additional_months == 0 {
            return Err(LedgerError::NothingToExtend);
        }

        let (delta, new_amount, new_months) = {
            let state = self.state.read().await;
            let owner = state
                .store
                .owner_of(id)
                .ok_or(LedgerError::PositionNotFound(id))?;
            if owner != caller {
                return Err(LedgerError::NotOwner {
                    caller: caller.clone(),
                    id,
                });
            }
            let position = state.store.get(id)?;

            let new_amount = position
                .amount
                .checked_add(additional_amount)
                .ok_or(LedgerError::SupplyOverflow)?;
            if new_amount < self.config.minimum_stake {
                return Err(LedgerError::AmountBelowMinimum {
                    amount: new_amount,
                    minimum: self.config.minimum_stake,
                });
            }
            let new_months = position
                .lock_months
                .checked_add(additional_months)
                .ok_or(LedgerError::InvalidLockDuration {
                    months: u32::MAX,
                    max: MAX_LOCK_MONTHS,
                })?;
            validate_lock_months(new_months)?;

            let new_weight = u128::from(new_amount) * u128::from(new_months);
            let delta = new_weight - position.working_weight();
            if !state.supply.check_capacity(delta) {
                return Err(LedgerError::CapacityExceeded {
                    prospective: state.supply.total().saturating_add(delta),
                    limit: state.supply.limit(),
                });
            }
            (delta, new_amount, new_months)
        };

        if additional_amount > 0 {
            let available = self.token.balance_of(caller).await?;
            if available < additional_amount {
                return Err(LedgerError::InsufficientBalance {
                    available,
                    required: additional_amount,
                });
            }
        }

        // Checkpoint before the weight changes, so the extend cannot
        // retroactively alter unclaimed-reward accounting.
        self.rewards.calculate_staking_rewards(id).await?;
        if additional_amount > 0 {
            self.token.transfer_from(caller, additional_amount).await?;
        }

        {
            let mut state = self.state.write().await;
            {
                let position = state.store.get_mut(id)?;
                position.amount = new_amount;
                position.lock_months = new_months;
            }
            state.supply.apply_delta(delta as i128)?;
        }

        self.record(
            LedgerEventType::Extended,
            EventData::Extended(ExtendedData {
                id,
                additional_amount,
                additional_months,
                weight_delta: delta,
            }),
        )
        .await;
        info!(id = %id, additional_amount, additional_months, weight_delta = delta, "position extended");
        Ok(())
    }

    /// Burns one unlocked position and pays principal plus claimed
    /// rewards to `recipient`. Returns the payout.
    pub async fn unstake(
        &self,
        caller: &Address,
        id: PositionId,
        recipient: &Address,
    ) -> Result<u64, LedgerError> {
        let _guard = self.enter()?;
        self.gate.ensure_not_paused().await?;
        if recipient.is_null() {
            return Err(LedgerError::NullRecipient);
        }

        let now = self.clock.now();
        let principal = {
            let state = self.state.read().await;
            let owner = state
                .store
                .owner_of(id)
                .ok_or(LedgerError::PositionNotFound(id))?;
            if owner != caller {
                return Err(LedgerError::NotOwner {
                    caller: caller.clone(),
                    id,
                });
            }
            let position = state.store.get(id)?;
            if !position.is_unlocked(now) {
                return Err(LedgerError::StillLocked {
                    id,
                    unlock_time: position.unlock_time(),
                });
            }
            position.amount
        };

        let (rewards, _per_id) = self.rewards.claim_rewards_for_stakes(&[id]).await?;
        let payout = principal
            .checked_add(rewards)
            .ok_or(LedgerError::SupplyOverflow)?;
        self.token.transfer(recipient, payout).await?;

        {
            let mut state = self.state.write().await;
            state.apply_ownership_change(Some(caller), None, &[id], now)?;
        }

        self.record(
            LedgerEventType::Unstaked,
            EventData::Unstaked(UnstakedData {
                ids: vec![id],
                recipient: recipient.clone(),
                principal,
                rewards,
            }),
        )
        .await;
        info!(id = %id, recipient = %recipient, principal, rewards, "position unstaked");
        Ok(payout)
    }

    /// Burns every unlocked position the caller holds and pays the
    /// summed principal plus claimed rewards to `recipient` in one
    /// transfer. Rejects when nothing is unlocked.
    pub async fn unstake_all(
        &self,
        caller: &Address,
        recipient: &Address,
    ) -> Result<u64, LedgerError> {
        let _guard = self.enter()?;
        self.gate.ensure_not_paused().await?;
        if recipient.is_null() {
            return Err(LedgerError::NullRecipient);
        }

        let now = self.clock.now();
        let (ids, principal) = {
            let state = self.state.read().await;
            let mut ids = Vec::new();
            let mut principal: u64 = 0;
            for id in state.store.positions_of(caller) {
                let position = state.store.get(id)?;
                if position.is_unlocked(now) {
                    ids.push(id);
                    principal = principal
                        .checked_add(position.amount)
                        .ok_or(LedgerError::SupplyOverflow)?;
                }
            }
            (ids, principal)
        };
        if ids.is_empty() {
            return Err(LedgerError::NoUnlockedPositions);
        }

        let (rewards, _per_id) = self.rewards.claim_rewards_for_stakes(&ids).await?;
        let payout = principal
            .checked_add(rewards)
            .ok_or(LedgerError::SupplyOverflow)?;
        self.token.transfer(recipient, payout).await?;

        {
            let mut state = self.state.write().await;
            state.apply_ownership_change(Some(caller), None, &ids, now)?;
        }

        self.record(
            LedgerEventType::Unstaked,
            EventData::Unstaked(UnstakedData {
                ids: ids.clone(),
                recipient: recipient.clone(),
                principal,
                rewards,
            }),
        )
        .await;
        info!(
            caller = %caller,
            recipient = %recipient,
            burned = ids.len(),
            principal,
            rewards,
            "all unlocked positions unstaked"
        );
        Ok(payout)
    }

    /// Claims accrued rewards for the given stakes and folds each
    /// claimed amount into that stake's principal. Durations are
    /// untouched; the aggregate delta `Σ claimed_i * lock_months_i` is
    /// applied once after the batch.
    ///
    /// Permissionless: it only converts already-claimed rewards into
    /// principal and cannot reduce anyone's balance. Returns the total
    /// claimed amount.
    ///
    /// Claim amounts are only knowable by claiming, so a
    /// `CapacityExceeded` rejection lands after the claim: the claimed
    /// tokens then sit in custody, credited to no position. Callers
    /// near the capacity ceiling should compound in smaller batches.
    pub async fn compound_for_stakes(&self, ids: &[PositionId]) -> Result<u64, LedgerError> {
        let _guard = self.enter()?;
        self.gate.ensure_not_paused().await?;
        if ids.is_empty() {
            return Ok(0);
        }
        {
            let state = self.state.read().await;
            for &id in ids {
                state.store.get(id)?;
            }
        }

        let (total, per_id) = self.rewards.claim_rewards_for_stakes(ids).await?;

        let delta = {
            let state = self.state.read().await;
            let mut delta: u128 = 0;
            for (&id, &claimed) in ids.iter().zip(&per_id) {
                let position = state.store.get(id)?;
                position
                    .amount
                    .checked_add(claimed)
                    .ok_or(LedgerError::SupplyOverflow)?;
                delta = delta
                    .checked_add(u128::from(claimed) * u128::from(position.lock_months))
                    .ok_or(LedgerError::SupplyOverflow)?;
            }
            if !state.supply.check_capacity(delta) {
                return Err(LedgerError::CapacityExceeded {
                    prospective: state.supply.total().saturating_add(delta),
                    limit: state.supply.limit(),
                });
            }
            delta
        };

        {
            let mut state = self.state.write().await;
            for (&id, &claimed) in ids.iter().zip(&per_id) {
                let position = state.store.get_mut(id)?;
                position.amount = position
                    .amount
                    .checked_add(claimed)
                    .ok_or(LedgerError::SupplyOverflow)?;
            }
            state.supply.apply_delta(delta as i128)?;
        }

        self.record(
            LedgerEventType::Compounded,
            EventData::Compounded(CompoundedData {
                ids: ids.to_vec(),
                amounts: per_id,
                weight_delta: delta,
            }),
        )
        .await;
        info!(stakes = ids.len(), total, weight_delta = delta, "rewards compounded");
        Ok(total)
    }

    /// Claims the caller's vault-side rewards and folds them into one
    /// position the caller owns. Unlike
    /// [`compound_for_stakes`](Self::compound_for_stakes) the target is
    /// nominated by the caller, so ownership is enforced. Returns the
    /// claimed amount.
    pub async fn compound_vault_rewards(
        &self,
        caller: &Address,
        id: PositionId,
    ) -> Result<u64, LedgerError> {
        let _guard = self.enter()?;
        self.gate.ensure_not_paused().await?;

        let lock_months = {
            let state = self.state.read().await;
            let owner = state
                .store
                .owner_of(id)
                .ok_or(LedgerError::PositionNotFound(id))?;
            if owner != caller {
                return Err(LedgerError::NotOwner {
                    caller: caller.clone(),
                    id,
                });
            }
            state.store.get(id)?.lock_months
        };

        let (total, _per_user) = self
            .rewards
            .claim_vault_rewards_for_users(std::slice::from_ref(caller))
            .await?;
        if total == 0 {
            debug!(id = %id, caller = %caller, "no vault rewards to compound");
            return Ok(0);
        }

        let delta = u128::from(total) * u128::from(lock_months);
        {
            let mut state = self.state.write().await;
            if !state.supply.check_capacity(delta) {
                return Err(LedgerError::CapacityExceeded {
                    prospective: state.supply.total().saturating_add(delta),
                    limit: state.supply.limit(),
                });
            }
            {
                let position = state.store.get_mut(id)?;
                position.amount = position
                    .amount
                    .checked_add(total)
                    .ok_or(LedgerError::SupplyOverflow)?;
            }
            state.supply.apply_delta(delta as i128)?;
        }

        self.record(
            LedgerEventType::Compounded,
            EventData::Compounded(CompoundedData {
                ids: vec![id],
                amounts: vec![total],
                weight_delta: delta,
            }),
        )
        .await;
        info!(id = %id, caller = %caller, total, "vault rewards compounded");
        Ok(total)
    }

    /// Moves ownership of the given positions from the caller to `to`.
    ///
    /// The aggregate is untouched — working weight does not depend on
    /// the owner — but `last_transfer_time` is refreshed on every id and
    /// the owner indexes are updated for both parties. Each id may be
    /// listed once; an empty batch is a no-op and journals nothing.
    pub async fn transfer(
        &self,
        caller: &Address,
        to: &Address,
        ids: &[PositionId],
    ) -> Result<(), LedgerError> {
        let _guard = self.enter()?;
        self.gate.ensure_not_paused().await?;
        if to.is_null() {
            return Err(LedgerError::NullRecipient);
        }
        self.gate.ensure_can_receive(to).await?;
        if ids.is_empty() {
            return Ok(());
        }

        {
            let state = self.state.read().await;
            let mut seen = HashSet::with_capacity(ids.len());
            for &id in ids {
                // A repeated id would detach the recipient's owner-of
                // entry and double-count in the owned set.
                if !seen.insert(id) {
                    return Err(LedgerError::DuplicateId(id));
                }
                let owner = state
                    .store
                    .owner_of(id)
                    .ok_or(LedgerError::PositionNotFound(id))?;
                if owner != caller {
                    return Err(LedgerError::NotOwner {
                        caller: caller.clone(),
                        id,
                    });
                }
            }
        }

        let now = self.clock.now();
        {
            let mut state = self.state.write().await;
            state.apply_ownership_change(Some(caller), Some(to), ids, now)?;
        }

        self.record(
            LedgerEventType::Transferred,
            EventData::Transferred(TransferredData {
                ids: ids.to_vec(),
                from: caller.clone(),
                to: to.clone(),
            }),
        )
        .await;
        info!(from = %caller, to = %to, moved = ids.len(), "positions transferred");
        Ok(())
    }

    /// Asks each listed vault to recompute `user`'s boosted balance.
    ///
    /// The whole batch is rejected before any update when a listed vault
    /// fails the capability check; a failure from the vault call itself
    /// propagates as-is. Vaults where the user holds no balance are
    /// skipped.
    pub async fn refresh_boost(
        &self,
        user: &Address,
        vaults: &[Arc<dyn BoostVault>],
    ) -> Result<(), LedgerError> {
        let _guard = self.enter()?;
        self.gate.ensure_not_paused().await?;

        for vault in vaults {
            if !vault.supports_boost_refresh().await {
                return Err(LedgerError::MissingBoostCapability(vault.address().clone()));
            }
        }

        let mut refreshed = Vec::new();
        for vault in vaults {
            if vault.balance_of(user).await? > 0 {
                vault
                    .update_boosted_balances_for_users(std::slice::from_ref(user))
                    .await?;
                refreshed.push(vault.address().clone());
            }
        }

        self.record(
            LedgerEventType::BoostRefreshed,
            EventData::BoostRefreshed(BoostRefreshedData {
                user: user.clone(),
                vaults: refreshed.clone(),
            }),
        )
        .await;
        info!(user = %user, refreshed = refreshed.len(), "vault boosts refreshed");
        Ok(())
    }

    /// Sum of `amount * lock_months` over `owner`'s live positions.
    pub async fn working_balance_of(&self, owner: &Address) -> u128 {
        self.state.read().await.working_balance_of(owner)
    }

    /// Current total working supply.
    pub async fn total_working_supply(&self) -> u128 {
        self.state.read().await.supply.total()
    }

    /// Live position ids held by `owner`, in insertion order.
    pub async fn positions_of(&self, owner: &Address) -> Vec<PositionId> {
        self.state.read().await.store.positions_of(owner)
    }

    /// Snapshot of a live position.
    pub async fn position(&self, id: PositionId) -> Result<Position, LedgerError> {
        Ok(self.state.read().await.store.get(id)?.clone())
    }

    /// Current owner of a live position.
    pub async fn owner_of(&self, id: PositionId) -> Option<Address> {
        self.state.read().await.store.owner_of(id).cloned()
    }

    /// Snapshot of the committed-operation journal.
    pub async fn events(&self) -> Vec<LedgerEvent> {
        self.journal.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use stakelock_collaborators::ManualClock;
    use stakelock_collaborators::memory::{
        InMemoryToken, ManualGate, ScriptedRewardsEngine, StaticAllowList, TestVault,
    };
    use stakelock_domain::SECONDS_PER_MONTH;
    use tokio::sync::Mutex;

    const START: u64 = 1_700_000_000;

    struct Harness {
        ledger: StakingLedger,
        token: Arc<InMemoryToken>,
        rewards: Arc<ScriptedRewardsEngine>,
        gatekeeper: Arc<ManualGate>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(config: LedgerConfig) -> Harness {
        let token = Arc::new(InMemoryToken::new());
        let rewards = Arc::new(ScriptedRewardsEngine::with_token(token.clone()));
        let gatekeeper = Arc::new(ManualGate::new());
        let clock = Arc::new(ManualClock::new(START));
        let ledger = StakingLedger::new(
            config,
            rewards.clone(),
            token.clone(),
            gatekeeper.clone(),
            clock.clone(),
        );
        Harness {
            ledger,
            token,
            rewards,
            gatekeeper,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(LedgerConfig::default())
    }

    fn alice() -> Address {
        Address::from("alice")
    }

    fn bob() -> Address {
        Address::from("bob")
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[tokio::test]
    async fn test_stake_unstake_round_trip() {
        init_tracing();
        let h = harness();
        h.token.mint(&alice(), 1_000).await;

        let id = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 12)
            .await
            .expect("stake");
        assert_eq!(id, PositionId(0));
        assert_eq!(h.ledger.working_balance_of(&alice()).await, 12_000);
        assert_eq!(h.ledger.total_working_supply().await, 12_000);
        assert_eq!(h.token.balance_of(&alice()).await.expect("balance"), 0);
        assert_eq!(h.token.custody().await, 1_000);
        assert_eq!(h.rewards.checkpoints().await, vec![id]);

        // Exactly at the unlock boundary the position stays locked.
        h.clock.set(START + 12 * SECONDS_PER_MONTH);
        assert!(matches!(
            h.ledger.unstake(&alice(), id, &alice()).await,
            Err(LedgerError::StillLocked { .. })
        ));

        h.clock.advance(1);
        h.rewards.set_reward(id, 25).await;
        let payout = h
            .ledger
            .unstake(&alice(), id, &alice())
            .await
            .expect("unstake");
        assert_eq!(payout, 1_025);
        assert_eq!(h.token.balance_of(&alice()).await.expect("balance"), 1_025);
        assert_eq!(h.token.custody().await, 0);
        assert_eq!(h.ledger.working_balance_of(&alice()).await, 0);
        assert_eq!(h.ledger.total_working_supply().await, 0);
        assert!(h.ledger.positions_of(&alice()).await.is_empty());
    }

    #[tokio::test]
    async fn test_stake_input_validation() {
        let h = harness_with(LedgerConfig {
            minimum_stake: 100,
            staking_limit: u128::MAX,
        });
        h.token.mint(&alice(), 1_000).await;

        assert!(matches!(
            h.ledger.stake(&alice(), &Address::new(""), 500, 12).await,
            Err(LedgerError::NullRecipient)
        ));
        assert!(matches!(
            h.ledger.stake(&alice(), &alice(), 0, 12).await,
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            h.ledger.stake(&alice(), &alice(), 99, 12).await,
            Err(LedgerError::AmountBelowMinimum { .. })
        ));
        assert!(matches!(
            h.ledger.stake(&alice(), &alice(), 500, 0).await,
            Err(LedgerError::InvalidLockDuration { .. })
        ));
        assert!(matches!(
            h.ledger.stake(&alice(), &alice(), 500, 61).await,
            Err(LedgerError::InvalidLockDuration { .. })
        ));
        assert!(matches!(
            h.ledger.stake(&alice(), &alice(), 2_000, 12).await,
            Err(LedgerError::InsufficientBalance { .. })
        ));

        // Nothing was touched by any of the rejections.
        assert_eq!(h.ledger.total_working_supply().await, 0);
        assert!(h.ledger.events().await.is_empty());
        assert_eq!(h.token.custody().await, 0);
    }

    #[tokio::test]
    async fn test_minimum_stake_boundary_is_strict_at_creation() {
        let h = harness_with(LedgerConfig {
            minimum_stake: 100,
            staking_limit: u128::MAX,
        });
        h.token.mint(&alice(), 300).await;

        // Exactly the minimum is still too small at creation.
        assert!(matches!(
            h.ledger.stake(&alice(), &alice(), 100, 12).await,
            Err(LedgerError::AmountBelowMinimum {
                amount: 100,
                minimum: 100,
            })
        ));
        let id = h
            .ledger
            .stake(&alice(), &alice(), 101, 12)
            .await
            .expect("one above the minimum");

        // Extend only keeps the total at or above the minimum.
        h.ledger
            .extend(&alice(), id, 1, 0)
            .await
            .expect("extend above the floor");
        assert_eq!(h.ledger.position(id).await.expect("live").amount, 102);
    }

    #[tokio::test]
    async fn test_capacity_limit_gates_growth() {
        let h = harness_with(LedgerConfig {
            minimum_stake: 1,
            staking_limit: 20_000,
        });
        h.token.mint(&alice(), 10_000).await;

        let first = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 12)
            .await
            .expect("stake within limit");
        assert!(matches!(
            h.ledger.stake(&alice(), &alice(), 1_000, 12).await,
            Err(LedgerError::CapacityExceeded { .. })
        ));

        h.ledger
            .stake(&alice(), &alice(), 500, 12)
            .await
            .expect("smaller stake fits");
        assert_eq!(h.ledger.total_working_supply().await, 18_000);

        assert!(matches!(
            h.ledger.extend(&alice(), first, 0, 3).await,
            Err(LedgerError::CapacityExceeded { .. })
        ));
        h.ledger
            .extend(&alice(), first, 0, 2)
            .await
            .expect("extend up to the limit");
        assert_eq!(h.ledger.total_working_supply().await, 20_000);
    }

    #[tokio::test]
    async fn test_allow_list_gates_stake_and_transfer() {
        let allow_list = Arc::new(StaticAllowList::new());
        allow_list.allow(&alice()).await;

        let mut h = harness();
        h.ledger.set_allow_list(allow_list.clone());
        h.token.mint(&alice(), 600).await;

        let id = h
            .ledger
            .stake(&alice(), &alice(), 300, 6)
            .await
            .expect("allowed recipient");
        assert!(matches!(
            h.ledger.stake(&alice(), &bob(), 300, 6).await,
            Err(LedgerError::AccessDenied(_))
        ));
        assert!(matches!(
            h.ledger.transfer(&alice(), &bob(), &[id]).await,
            Err(LedgerError::AccessDenied(_))
        ));

        allow_list.allow(&bob()).await;
        h.ledger
            .transfer(&alice(), &bob(), &[id])
            .await
            .expect("allowed transfer");
        assert_eq!(h.ledger.owner_of(id).await, Some(bob()));
    }

    #[tokio::test]
    async fn test_paused_ledger_rejects_operations() {
        let h = harness();
        h.token.mint(&alice(), 500).await;
        h.gatekeeper.set_paused(true);

        assert!(matches!(
            h.ledger.stake(&alice(), &alice(), 500, 6).await,
            Err(LedgerError::Paused)
        ));
        assert!(matches!(
            h.ledger.compound_for_stakes(&[PositionId(0)]).await,
            Err(LedgerError::Paused)
        ));

        h.gatekeeper.set_paused(false);
        h.ledger
            .stake(&alice(), &alice(), 500, 6)
            .await
            .expect("resumes after unpause");
    }

    #[tokio::test]
    async fn test_extend_scenario() {
        init_tracing();
        let h = harness();
        h.token.mint(&alice(), 1_500).await;

        let id = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 12)
            .await
            .expect("stake");
        h.ledger
            .extend(&alice(), id, 500, 6)
            .await
            .expect("extend");

        let position = h.ledger.position(id).await.expect("live");
        assert_eq!(position.amount, 1_500);
        assert_eq!(position.lock_months, 18);
        assert_eq!(position.start_time, START);
        assert_eq!(position.working_weight(), 27_000);
        assert_eq!(h.ledger.total_working_supply().await, 27_000);
        assert_eq!(h.token.custody().await, 1_500);
        // Checkpointed once at stake, once before the weight changed.
        assert_eq!(h.rewards.checkpoints().await, vec![id, id]);

        let events = h.ledger.events().await;
        match &events.last().expect("extend event").data {
            EventData::Extended(data) => assert_eq!(data.weight_delta, 15_000),
            other => panic!("unexpected event data: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_extend_rejections() {
        let h = harness();
        h.token.mint(&alice(), 1_000).await;
        let id = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 12)
            .await
            .expect("stake");

        assert!(matches!(
            h.ledger.extend(&bob(), id, 100, 0).await,
            Err(LedgerError::NotOwner { .. })
        ));
        assert!(matches!(
            h.ledger.extend(&alice(), id, 0, 0).await,
            Err(LedgerError::NothingToExtend)
        ));
        assert!(matches!(
            h.ledger.extend(&alice(), id, 0, 49).await,
            Err(LedgerError::InvalidLockDuration { .. })
        ));
        assert!(matches!(
            h.ledger.extend(&alice(), PositionId(7), 0, 1).await,
            Err(LedgerError::PositionNotFound(_))
        ));
        assert_eq!(h.ledger.total_working_supply().await, 12_000);
    }

    #[tokio::test]
    async fn test_unstake_requires_ownership() {
        let h = harness();
        h.token.mint(&alice(), 100).await;
        let id = h
            .ledger
            .stake(&alice(), &alice(), 100, 1)
            .await
            .expect("stake");
        h.clock.set(START + SECONDS_PER_MONTH + 1);

        assert!(matches!(
            h.ledger.unstake(&bob(), id, &bob()).await,
            Err(LedgerError::NotOwner { .. })
        ));
        assert_eq!(h.ledger.total_working_supply().await, 100);
    }

    #[tokio::test]
    async fn test_unstake_all_filters_unlocked() {
        let h = harness();
        h.token.mint(&alice(), 600).await;

        let short = h
            .ledger
            .stake(&alice(), &alice(), 100, 1)
            .await
            .expect("stake");
        let medium = h
            .ledger
            .stake(&alice(), &alice(), 200, 2)
            .await
            .expect("stake");
        let long = h
            .ledger
            .stake(&alice(), &alice(), 300, 36)
            .await
            .expect("stake");

        assert!(matches!(
            h.ledger.unstake_all(&alice(), &bob()).await,
            Err(LedgerError::NoUnlockedPositions)
        ));

        h.clock.set(START + 2 * SECONDS_PER_MONTH + 1);
        h.rewards.set_reward(short, 5).await;
        h.rewards.set_reward(medium, 7).await;

        let payout = h
            .ledger
            .unstake_all(&alice(), &bob())
            .await
            .expect("unstake all");
        assert_eq!(payout, 312);
        assert_eq!(h.token.balance_of(&bob()).await.expect("balance"), 312);
        assert_eq!(h.ledger.positions_of(&alice()).await, vec![long]);
        assert_eq!(h.ledger.total_working_supply().await, 300 * 36);
    }

    #[tokio::test]
    async fn test_compound_scenario() {
        let h = harness();
        h.token.mint(&alice(), 2_000).await;

        let first = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 12)
            .await
            .expect("stake");
        let second = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 24)
            .await
            .expect("stake");
        assert_eq!(h.ledger.total_working_supply().await, 36_000);

        h.rewards.set_reward(first, 50).await;
        h.rewards.set_reward(second, 100).await;

        let total = h
            .ledger
            .compound_for_stakes(&[first, second])
            .await
            .expect("compound");
        assert_eq!(total, 150);

        let p0 = h.ledger.position(first).await.expect("live");
        let p1 = h.ledger.position(second).await.expect("live");
        assert_eq!((p0.amount, p0.lock_months), (1_050, 12));
        assert_eq!((p1.amount, p1.lock_months), (1_100, 24));
        // Aggregate delta 50*12 + 100*24, applied once.
        assert_eq!(h.ledger.total_working_supply().await, 39_000);
    }

    #[tokio::test]
    async fn test_compound_respects_capacity() {
        let h = harness_with(LedgerConfig {
            minimum_stake: 1,
            staking_limit: 36_500,
        });
        h.token.mint(&alice(), 2_000).await;
        let first = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 12)
            .await
            .expect("stake");
        let second = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 24)
            .await
            .expect("stake");

        h.rewards.set_reward(first, 50).await;
        h.rewards.set_reward(second, 100).await;
        assert!(matches!(
            h.ledger.compound_for_stakes(&[first, second]).await,
            Err(LedgerError::CapacityExceeded { .. })
        ));

        // No local mutation happened.
        assert_eq!(h.ledger.position(first).await.expect("live").amount, 1_000);
        assert_eq!(h.ledger.total_working_supply().await, 36_000);
    }

    #[tokio::test]
    async fn test_compound_rejects_unknown_ids() {
        let h = harness();
        assert!(matches!(
            h.ledger.compound_for_stakes(&[PositionId(3)]).await,
            Err(LedgerError::PositionNotFound(_))
        ));
        assert_eq!(
            h.ledger.compound_for_stakes(&[]).await.expect("empty batch"),
            0
        );
    }

    #[tokio::test]
    async fn test_compound_vault_rewards_requires_ownership() {
        let h = harness();
        h.token.mint(&alice(), 1_000).await;
        let id = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 12)
            .await
            .expect("stake");
        h.rewards.set_vault_reward(&alice(), 80).await;

        assert!(matches!(
            h.ledger.compound_vault_rewards(&bob(), id).await,
            Err(LedgerError::NotOwner { .. })
        ));

        let claimed = h
            .ledger
            .compound_vault_rewards(&alice(), id)
            .await
            .expect("compound");
        assert_eq!(claimed, 80);
        assert_eq!(h.ledger.position(id).await.expect("live").amount, 1_080);
        assert_eq!(h.ledger.total_working_supply().await, 12_000 + 80 * 12);

        // Scripted rewards are one-shot; a second claim is a no-op.
        let claimed = h
            .ledger
            .compound_vault_rewards(&alice(), id)
            .await
            .expect("nothing left");
        assert_eq!(claimed, 0);
        assert_eq!(h.ledger.total_working_supply().await, 12_000 + 80 * 12);
    }

    #[tokio::test]
    async fn test_transfer_moves_ownership_not_weight() {
        let h = harness();
        h.token.mint(&alice(), 300).await;
        let first = h
            .ledger
            .stake(&alice(), &alice(), 100, 6)
            .await
            .expect("stake");
        let second = h
            .ledger
            .stake(&alice(), &alice(), 200, 6)
            .await
            .expect("stake");

        h.clock.advance(42);
        h.ledger
            .transfer(&alice(), &bob(), &[first])
            .await
            .expect("transfer");

        assert_eq!(h.ledger.positions_of(&alice()).await, vec![second]);
        assert_eq!(h.ledger.positions_of(&bob()).await, vec![first]);
        assert_eq!(h.ledger.owner_of(first).await, Some(bob()));
        assert_eq!(h.ledger.total_working_supply().await, 1_800);
        assert_eq!(h.ledger.working_balance_of(&alice()).await, 1_200);
        assert_eq!(h.ledger.working_balance_of(&bob()).await, 600);

        let moved = h.ledger.position(first).await.expect("live");
        assert_eq!(moved.start_time, START);
        assert_eq!(moved.last_transfer_time, START + 42);

        assert!(matches!(
            h.ledger.transfer(&alice(), &bob(), &[first]).await,
            Err(LedgerError::NotOwner { .. })
        ));
    }

    #[tokio::test]
    async fn test_transfer_rejects_duplicate_ids() {
        let h = harness();
        h.token.mint(&alice(), 100).await;
        let id = h
            .ledger
            .stake(&alice(), &alice(), 100, 1)
            .await
            .expect("stake");

        assert!(matches!(
            h.ledger.transfer(&alice(), &bob(), &[id, id]).await,
            Err(LedgerError::DuplicateId(duplicate)) if duplicate == id
        ));
        assert_eq!(h.ledger.positions_of(&alice()).await, vec![id]);
        assert!(h.ledger.positions_of(&bob()).await.is_empty());
        assert_eq!(h.ledger.working_balance_of(&bob()).await, 0);
        assert_eq!(h.ledger.owner_of(id).await, Some(alice()));

        // A clean transfer still works and the recipient can wind down
        // without hitting a stale index entry.
        h.ledger
            .transfer(&alice(), &bob(), &[id])
            .await
            .expect("transfer");
        h.clock.set(START + SECONDS_PER_MONTH + 1);
        let payout = h
            .ledger
            .unstake_all(&bob(), &bob())
            .await
            .expect("unstake all");
        assert_eq!(payout, 100);
        assert!(h.ledger.positions_of(&bob()).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_transfer_is_a_silent_noop() {
        let h = harness();
        h.ledger
            .transfer(&alice(), &bob(), &[])
            .await
            .expect("empty batch");
        assert!(h.ledger.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_boost_skips_empty_balances() {
        let h = harness();
        let funded = Arc::new(TestVault::new("vault-a"));
        let empty = Arc::new(TestVault::new("vault-b"));
        funded.set_balance(&alice(), 10).await;

        let vaults: Vec<Arc<dyn BoostVault>> = vec![funded.clone(), empty.clone()];
        h.ledger
            .refresh_boost(&alice(), &vaults)
            .await
            .expect("refresh");

        assert_eq!(funded.refreshed().await, vec![alice()]);
        assert!(empty.refreshed().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_boost_capability_check_rejects_whole_batch() {
        let h = harness();
        let capable = Arc::new(TestVault::new("vault-a"));
        let incapable = Arc::new(TestVault::new("vault-b"));
        capable.set_balance(&alice(), 10).await;
        incapable.set_capable(false);

        let vaults: Vec<Arc<dyn BoostVault>> = vec![capable.clone(), incapable];
        assert!(matches!(
            h.ledger.refresh_boost(&alice(), &vaults).await,
            Err(LedgerError::MissingBoostCapability(addr)) if addr == Address::from("vault-b")
        ));
        // The capable vault was never touched.
        assert!(capable.refreshed().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_boost_propagates_vault_failure() {
        let h = harness();
        let vault = Arc::new(TestVault::new("vault-a"));
        vault.set_balance(&alice(), 10).await;
        vault.set_fail_update(true);

        let vaults: Vec<Arc<dyn BoostVault>> = vec![vault];
        assert!(matches!(
            h.ledger.refresh_boost(&alice(), &vaults).await,
            Err(LedgerError::External(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_token_transfer_leaves_no_partial_state() {
        let h = harness();
        h.token.mint(&alice(), 1_000).await;
        h.token.set_fail_transfers(true);

        assert!(matches!(
            h.ledger.stake(&alice(), &alice(), 1_000, 12).await,
            Err(LedgerError::External(_))
        ));
        assert_eq!(h.ledger.total_working_supply().await, 0);
        assert!(h.ledger.positions_of(&alice()).await.is_empty());
        assert!(h.ledger.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_ids_are_never_reused_after_closure() {
        let h = harness();
        h.token.mint(&alice(), 300).await;

        let first = h
            .ledger
            .stake(&alice(), &alice(), 100, 1)
            .await
            .expect("stake");
        h.clock.set(START + SECONDS_PER_MONTH + 1);
        h.ledger
            .unstake(&alice(), first, &alice())
            .await
            .expect("unstake");

        let second = h
            .ledger
            .stake(&alice(), &alice(), 100, 1)
            .await
            .expect("stake");
        assert_eq!(second, PositionId(1));
        assert!(matches!(
            h.ledger.position(first).await,
            Err(LedgerError::PositionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_aggregate_matches_live_positions() {
        let h = harness();
        h.token.mint(&alice(), 5_000).await;

        let first = h
            .ledger
            .stake(&alice(), &alice(), 1_000, 12)
            .await
            .expect("stake");
        let second = h
            .ledger
            .stake(&alice(), &alice(), 500, 1)
            .await
            .expect("stake");
        let third = h
            .ledger
            .stake(&alice(), &alice(), 2_000, 24)
            .await
            .expect("stake");

        h.ledger
            .extend(&alice(), first, 250, 3)
            .await
            .expect("extend");
        h.ledger
            .transfer(&alice(), &bob(), &[third])
            .await
            .expect("transfer");
        h.rewards.set_reward(third, 90).await;
        h.ledger
            .compound_for_stakes(&[third])
            .await
            .expect("compound");
        h.clock.set(START + SECONDS_PER_MONTH + 1);
        h.ledger
            .unstake(&alice(), second, &alice())
            .await
            .expect("unstake");

        let mut recomputed: u128 = 0;
        for owner in [alice(), bob()] {
            for id in h.ledger.positions_of(&owner).await {
                recomputed += h
                    .ledger
                    .position(id)
                    .await
                    .expect("live")
                    .working_weight();
            }
        }
        assert_eq!(h.ledger.total_working_supply().await, recomputed);
    }

    #[tokio::test]
    async fn test_journal_records_committed_operations_in_order() {
        let h = harness();
        h.token.mint(&alice(), 1_000).await;

        let id = h
            .ledger
            .stake(&alice(), &alice(), 500, 2)
            .await
            .expect("stake");
        h.ledger
            .extend(&alice(), id, 0, 1)
            .await
            .expect("extend");
        h.ledger
            .transfer(&alice(), &bob(), &[id])
            .await
            .expect("transfer");

        let kinds: Vec<LedgerEventType> = h
            .ledger
            .events()
            .await
            .into_iter()
            .map(|event| event.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                LedgerEventType::Staked,
                LedgerEventType::Extended,
                LedgerEventType::Transferred,
            ]
        );
    }

    /// Rewards engine that calls back into the ledger mid-operation.
    #[derive(Default)]
    struct ReentrantEngine {
        ledger: Mutex<Option<Arc<StakingLedger>>>,
        observed: Mutex<Option<LedgerError>>,
    }

    #[async_trait]
    impl RewardsEngine for ReentrantEngine {
        async fn calculate_staking_rewards(&self, _id: PositionId) -> Result<()> {
            if let Some(ledger) = self.ledger.lock().await.clone() {
                if let Err(err) = ledger.stake(&alice(), &alice(), 100, 1).await {
                    *self.observed.lock().await = Some(err);
                }
            }
            Ok(())
        }

        async fn claim_rewards_for_stakes(&self, ids: &[PositionId]) -> Result<(u64, Vec<u64>)> {
            Ok((0, vec![0; ids.len()]))
        }

        async fn claim_vault_rewards_for_users(
            &self,
            users: &[Address],
        ) -> Result<(u64, Vec<u64>)> {
            Ok((0, vec![0; users.len()]))
        }
    }

    #[tokio::test]
    async fn test_reentrant_call_is_rejected() {
        let token = Arc::new(InMemoryToken::new());
        let engine = Arc::new(ReentrantEngine::default());
        let ledger = Arc::new(StakingLedger::new(
            LedgerConfig::default(),
            engine.clone(),
            token.clone(),
            Arc::new(ManualGate::new()),
            Arc::new(ManualClock::new(START)),
        ));
        *engine.ledger.lock().await = Some(ledger.clone());
        token.mint(&alice(), 1_000).await;

        let id = ledger
            .stake(&alice(), &alice(), 1_000, 12)
            .await
            .expect("outer stake");
        assert_eq!(id, PositionId(0));
        assert!(matches!(
            *engine.observed.lock().await,
            Some(LedgerError::Reentrancy)
        ));
        // The rejected inner call left no trace on the outer result.
        assert_eq!(ledger.total_working_supply().await, 12_000);
        assert_eq!(ledger.positions_of(&alice()).await, vec![id]);
        assert_eq!(ledger.events().await.len(), 1);
    }
}
