//! Trait seams for the ledger's external collaborators.
//!
//! The accounting core consumes these as black-box services: the
//! rewards-calculation engine, external boost vaults, the optional
//! allow-list, the underlying (locked) token, and the pause gatekeeper.
//! Their internal logic is out of scope; only the call contracts matter.
//!
//! All fallible methods return `anyhow::Result` so failures propagate
//! opaquely into the ledger, aborting the whole operation with no
//! partial commit.

/// Time sources (wall clock and manual test clock).
pub mod clock;
/// In-memory reference implementations for tests and demos.
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use stakelock_domain::{Address, PositionId};

pub use clock::{Clock, ManualClock, SystemClock};

/// External rewards engine: checkpointing and reward payout.
#[async_trait]
pub trait RewardsEngine: Send + Sync {
    /// Checkpoints accounting for a stake. Must be invoked before the
    /// position's weight changes, so the change cannot retroactively
    /// alter unclaimed-reward accounting.
    async fn calculate_staking_rewards(&self, id: PositionId) -> Result<()>;

    /// Pays out accrued rewards for the given stakes. Returns the total
    /// and the per-id amounts, aligned by index with `ids`.
    async fn claim_rewards_for_stakes(&self, ids: &[PositionId]) -> Result<(u64, Vec<u64>)>;

    /// Vault-side analogue, keyed by user. Returns the total and the
    /// per-user amounts, aligned by index with `users`.
    async fn claim_vault_rewards_for_users(&self, users: &[Address]) -> Result<(u64, Vec<u64>)>;
}

/// External yield vault with boosted-balance support.
#[async_trait]
pub trait BoostVault: Send + Sync {
    /// Address this vault is known by.
    fn address(&self) -> &Address;

    /// Capability marker. A refresh batch is rejected in full when any
    /// listed vault lacks it.
    async fn supports_boost_refresh(&self) -> bool;

    /// The user's balance inside the vault.
    async fn balance_of(&self, user: &Address) -> Result<u64>;

    /// Asks the vault to recompute boosted balances for the users.
    async fn update_boosted_balances_for_users(&self, users: &[Address]) -> Result<()>;
}

/// Optional access allow-list. Consulted only when configured.
#[async_trait]
pub trait AllowList: Send + Sync {
    async fn has_access(&self, user: &Address) -> Result<bool>;
}

/// The underlying fungible token being locked.
#[async_trait]
pub trait UnderlyingToken: Send + Sync {
    /// Spendable balance of `owner`.
    async fn balance_of(&self, owner: &Address) -> Result<u64>;

    /// Pulls `amount` from `from` into the ledger's custody.
    async fn transfer_from(&self, from: &Address, amount: u64) -> Result<()>;

    /// Pays `amount` out of the ledger's custody to `to`.
    async fn transfer(&self, to: &Address, amount: u64) -> Result<()>;
}

/// External pause switch consulted before every operation.
#[async_trait]
pub trait Gatekeeper: Send + Sync {
    async fn is_paused(&self) -> bool;
}
