use crate::address::Address;
use crate::position::PositionId;

/// Error taxonomy for ledger operations.
///
/// Input and authorization failures are raised before any state is
/// touched; capacity failures after computing the prospective delta but
/// before committing; state failures at their specific check point.
/// Collaborator failures propagate through [`LedgerError::External`] and
/// abort the whole operation. Every operation is all-or-nothing: no
/// partial commit is ever visible.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Zero or otherwise unusable token amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(u64),

    /// Creation-time stake at or below the configured minimum. Extend
    /// is looser: the new total only has to stay at or above it.
    #[error("amount {amount} must exceed the minimum stake {minimum}")]
    AmountBelowMinimum { amount: u64, minimum: u64 },

    /// Lock duration outside (0, max] months.
    #[error("lock duration of {months} months is outside (0, {max}]")]
    InvalidLockDuration { months: u32, max: u32 },

    /// A real recipient was required but the null address was given.
    #[error("recipient address is null")]
    NullRecipient,

    /// Caller does not own the position it tried to operate on.
    #[error("caller {caller} does not own position {id}")]
    NotOwner { caller: Address, id: PositionId },

    /// The same id was listed more than once in a batch operation.
    #[error("position {0} appears more than once in the batch")]
    DuplicateId(PositionId),

    /// Allow-list denial.
    #[error("address {0} is not on the allow-list")]
    AccessDenied(Address),

    /// The gatekeeper reports the ledger as paused.
    #[error("ledger is paused")]
    Paused,

    /// A collaborator called back into the ledger mid-operation.
    #[error("re-entrant ledger operation rejected")]
    Reentrancy,

    /// The working supply would exceed the staking limit.
    #[error("working supply of {prospective} would exceed the staking limit {limit}")]
    CapacityExceeded { prospective: u128, limit: u128 },

    /// The position's lock has not strictly elapsed yet.
    #[error("position {id} is locked until {unlock_time}")]
    StillLocked { id: PositionId, unlock_time: u64 },

    /// Unstake-all found nothing to process.
    #[error("no unlocked positions to process")]
    NoUnlockedPositions,

    /// Id out of range or already cleared.
    #[error("position {0} not found")]
    PositionNotFound(PositionId),

    /// A listed vault failed the boost capability check.
    #[error("vault {0} does not support boost refresh")]
    MissingBoostCapability(Address),

    /// Caller's underlying token balance cannot cover the deposit.
    #[error("insufficient underlying balance: have {available}, need {required}")]
    InsufficientBalance { available: u64, required: u64 },

    /// Extend must increase the amount, the duration, or both.
    #[error("extend must increase amount or duration")]
    NothingToExtend,

    /// Checked aggregate arithmetic overflowed; rejected rather than
    /// silently truncated.
    #[error("working supply arithmetic overflow")]
    SupplyOverflow,

    /// Failure from an external collaborator, propagated as-is.
    #[error(transparent)]
    External(#[from] anyhow::Error),
}
