//! In-memory reference implementations of the collaborator traits.
//!
//! These back the test suites and scenario demos. They keep honest
//! balances and payout bookkeeping so ledger tests can assert on token
//! movement end to end.

use crate::{AllowList, BoostVault, Gatekeeper, RewardsEngine, UnderlyingToken};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stakelock_domain::{Address, PositionId};
use tokio::sync::RwLock;
use tracing::debug;

/// Simple balance-map token with a single custody pot for the ledger.
#[derive(Debug, Default)]
pub struct InMemoryToken {
    balances: RwLock<HashMap<Address, u64>>,
    custody: RwLock<u64>,
    fail_transfers: AtomicBool,
}

impl InMemoryToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` to `owner`'s spendable balance (test setup).
    pub async fn mint(&self, owner: &Address, amount: u64) {
        *self.balances.write().await.entry(owner.clone()).or_default() += amount;
    }

    /// Tokens currently held in the ledger's custody.
    pub async fn custody(&self) -> u64 {
        *self.custody.read().await
    }

    /// Adds reward tokens directly to custody, the way an engine payout
    /// lands before the ledger forwards it.
    pub async fn credit_custody(&self, amount: u64) {
        *self.custody.write().await += amount;
    }

    /// Makes every subsequent transfer fail (external-failure tests).
    pub fn set_fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl UnderlyingToken for InMemoryToken {
    async fn balance_of(&self, owner: &Address) -> Result<u64> {
        Ok(self.balances.read().await.get(owner).copied().unwrap_or(0))
    }

    async fn transfer_from(&self, from: &Address, amount: u64) -> Result<()> {
        if self.fail_transfers.load(Ordering::SeqCst) {
            bail!("token transfer failed");
        }
        let mut balances = self.balances.write().await;
        let balance = balances.entry(from.clone()).or_default();
        if *balance < amount {
            bail!("insufficient balance for {from}: {balance} < {amount}");
        }
        *balance -= amount;
        *self.custody.write().await += amount;
        debug!(from = %from, amount, "tokens pulled into custody");
        Ok(())
    }

    async fn transfer(&self, to: &Address, amount: u64) -> Result<()> {
        if self.fail_transfers.load(Ordering::SeqCst) {
            bail!("token transfer failed");
        }
        {
            let mut custody = self.custody.write().await;
            if *custody < amount {
                bail!("custody underfunded: {custody} < {amount}");
            }
            *custody -= amount;
        }
        *self.balances.write().await.entry(to.clone()).or_default() += amount;
        debug!(to = %to, amount, "tokens paid out of custody");
        Ok(())
    }
}

/// Rewards engine with scripted, one-shot payout amounts.
#[derive(Default)]
pub struct ScriptedRewardsEngine {
    stake_rewards: RwLock<HashMap<PositionId, u64>>,
    vault_rewards: RwLock<HashMap<Address, u64>>,
    checkpoints: RwLock<Vec<PositionId>>,
    token: Option<Arc<InMemoryToken>>,
}

impl ScriptedRewardsEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs the engine with a token so payouts land in ledger custody.
    #[must_use]
    pub fn with_token(token: Arc<InMemoryToken>) -> Self {
        Self {
            token: Some(token),
            ..Self::default()
        }
    }

    /// Scripts the next claim for a stake.
    pub async fn set_reward(&self, id: PositionId, amount: u64) {
        self.stake_rewards.write().await.insert(id, amount);
    }

    /// Scripts the next vault-side claim for a user.
    pub async fn set_vault_reward(&self, user: &Address, amount: u64) {
        self.vault_rewards.write().await.insert(user.clone(), amount);
    }

    /// Ids checkpointed so far, in call order.
    pub async fn checkpoints(&self) -> Vec<PositionId> {
        self.checkpoints.read().await.clone()
    }

    async fn fund(&self, total: u64) {
        if let Some(token) = &self.token {
            token.credit_custody(total).await;
        }
    }
}

#[async_trait]
impl RewardsEngine for ScriptedRewardsEngine {
    async fn calculate_staking_rewards(&self, id: PositionId) -> Result<()> {
        self.checkpoints.write().await.push(id);
        Ok(())
    }

    async fn claim_rewards_for_stakes(&self, ids: &[PositionId]) -> Result<(u64, Vec<u64>)> {
        let mut rewards = self.stake_rewards.write().await;
        let per_id: Vec<u64> = ids
            .iter()
            .map(|id| rewards.remove(id).unwrap_or(0))
            .collect();
        let total = per_id.iter().sum();
        drop(rewards);
        self.fund(total).await;
        Ok((total, per_id))
    }

    async fn claim_vault_rewards_for_users(&self, users: &[Address]) -> Result<(u64, Vec<u64>)> {
        let mut rewards = self.vault_rewards.write().await;
        let per_user: Vec<u64> = users
            .iter()
            .map(|user| rewards.remove(user).unwrap_or(0))
            .collect();
        let total = per_user.iter().sum();
        drop(rewards);
        self.fund(total).await;
        Ok((total, per_user))
    }
}

/// Fixed-membership allow-list.
#[derive(Debug, Default)]
pub struct StaticAllowList {
    allowed: RwLock<HashSet<Address>>,
}

impl StaticAllowList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn allow(&self, user: &Address) {
        self.allowed.write().await.insert(user.clone());
    }
}

#[async_trait]
impl AllowList for StaticAllowList {
    async fn has_access(&self, user: &Address) -> Result<bool> {
        Ok(self.allowed.read().await.contains(user))
    }
}

/// Pause switch flipped by hand.
#[derive(Debug, Default)]
pub struct ManualGate {
    paused: AtomicBool,
}

impl ManualGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }
}

#[async_trait]
impl Gatekeeper for ManualGate {
    async fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Scriptable boost vault.
pub struct TestVault {
    address: Address,
    capable: AtomicBool,
    fail_update: AtomicBool,
    balances: RwLock<HashMap<Address, u64>>,
    refreshed: RwLock<Vec<Address>>,
}

impl TestVault {
    #[must_use]
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            capable: AtomicBool::new(true),
            fail_update: AtomicBool::new(false),
            balances: RwLock::new(HashMap::new()),
            refreshed: RwLock::new(Vec::new()),
        }
    }

    pub fn set_capable(&self, capable: bool) {
        self.capable.store(capable, Ordering::SeqCst);
    }

    pub fn set_fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub async fn set_balance(&self, user: &Address, amount: u64) {
        self.balances.write().await.insert(user.clone(), amount);
    }

    /// Users whose boosted balance was recomputed, in call order.
    pub async fn refreshed(&self) -> Vec<Address> {
        self.refreshed.read().await.clone()
    }
}

#[async_trait]
impl BoostVault for TestVault {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn supports_boost_refresh(&self) -> bool {
        self.capable.load(Ordering::SeqCst)
    }

    async fn balance_of(&self, user: &Address) -> Result<u64> {
        Ok(self.balances.read().await.get(user).copied().unwrap_or(0))
    }

    async fn update_boosted_balances_for_users(&self, users: &[Address]) -> Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            bail!("vault {} rejected the boost update", self.address);
        }
        self.refreshed.write().await.extend_from_slice(users);
        Ok(())
    }
}
