//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use stakelock_ledger::prelude::*;
//! ```

// Events
pub use crate::events::{
    BoostRefreshedData, CompoundedData, EventData, ExtendedData, LedgerEvent, LedgerEventType,
    StakedData, TransferredData, UnstakedData,
};

// Access gating
pub use crate::gate::AccessGate;

// Lifecycle orchestrator
pub use crate::lifecycle::StakingLedger;

// Aggregate state
pub use crate::state::LedgerState;

// Position storage
pub use crate::store::PositionStore;

// Supply accounting
pub use crate::supply::SupplyAccountant;

// Domain re-exports
pub use stakelock_domain::{
    Address, LedgerConfig, LedgerError, MAX_LOCK_MONTHS, Position, PositionId, SECONDS_PER_MONTH,
};
