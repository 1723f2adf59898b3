//! Ledger events, journaled after each committed operation.

use serde::{Deserialize, Serialize};
use stakelock_domain::{Address, PositionId};

/// Type of ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEventType {
    /// A position was created.
    Staked,
    /// A position's amount and/or duration was increased.
    Extended,
    /// One or more positions were burned and paid out.
    Unstaked,
    /// Claimed rewards were folded into principal.
    Compounded,
    /// Ownership moved between holders.
    Transferred,
    /// External vault boosts were recomputed for a user.
    BoostRefreshed,
}

/// A journaled ledger event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Event type.
    pub event_type: LedgerEventType,
    /// Timestamp.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Event-specific data.
    pub data: EventData,
}

impl LedgerEvent {
    /// Creates a new event stamped with the current wall-clock time.
    pub fn new(event_type: LedgerEventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: chrono::Utc::now(),
            data,
        }
    }
}

/// Event-specific data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventData {
    /// Stake data.
    Staked(StakedData),
    /// Extend data.
    Extended(ExtendedData),
    /// Unstake data.
    Unstaked(UnstakedData),
    /// Compound data.
    Compounded(CompoundedData),
    /// Transfer data.
    Transferred(TransferredData),
    /// Boost refresh data.
    BoostRefreshed(BoostRefreshedData),
}

/// Data for a created position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakedData {
    /// Assigned position id.
    pub id: PositionId,
    /// Receipt holder.
    pub owner: Address,
    /// Locked amount.
    pub amount: u64,
    /// Lock duration in months.
    pub lock_months: u32,
}

/// Data for an extended position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedData {
    /// Extended position id.
    pub id: PositionId,
    /// Extra amount locked (0 when duration-only).
    pub additional_amount: u64,
    /// Extra months (0 when amount-only).
    pub additional_months: u32,
    /// Exact aggregate delta applied.
    pub weight_delta: u128,
}

/// Data for an unstake (single or batch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnstakedData {
    /// Burned position ids.
    pub ids: Vec<PositionId>,
    /// Payout recipient.
    pub recipient: Address,
    /// Principal returned.
    pub principal: u64,
    /// Claimed rewards paid alongside the principal.
    pub rewards: u64,
}

/// Data for a compound (rewards folded into principal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundedData {
    /// Compounded position ids.
    pub ids: Vec<PositionId>,
    /// Claimed amount per id, aligned by index.
    pub amounts: Vec<u64>,
    /// Aggregate delta applied once after the batch.
    pub weight_delta: u128,
}

/// Data for an ownership transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferredData {
    /// Moved position ids.
    pub ids: Vec<PositionId>,
    /// Previous holder.
    pub from: Address,
    /// New holder.
    pub to: Address,
}

/// Data for a boost refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostRefreshedData {
    /// User whose boosts were recomputed.
    pub user: Address,
    /// Vaults that were asked to recompute.
    pub vaults: Vec<Address>,
}
