//! Core domain types for the StakeLock position ledger.
//!
//! This crate holds the pure data model shared by the rest of the
//! workspace:
//! - The [`Position`] entity and its working-weight / unlock arithmetic
//! - The [`Address`] and [`PositionId`] identifier newtypes
//! - Ledger-wide configuration ([`LedgerConfig`])
//! - The [`LedgerError`] taxonomy
//!
//! No I/O and no async live here.

/// Account identifier newtype.
pub mod address;
/// Ledger configuration and lock-duration constants.
pub mod config;
/// Error taxonomy for ledger operations.
pub mod error;
/// The position entity and its derived arithmetic.
pub mod position;

// Re-export for easier access
pub use address::Address;
pub use config::{LedgerConfig, MAX_LOCK_MONTHS, SECONDS_PER_MONTH};
pub use error::LedgerError;
pub use position::{Position, PositionId};
