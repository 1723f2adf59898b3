//! Position ledger and accounting core for token locking.
//!
//! Users deposit fungible tokens for a chosen lock duration and receive
//! a transferable position in return. This crate tracks per-position
//! state, keeps the aggregate working supply (`Σ amount * lock_months`)
//! consistent under every mint / transfer / burn / extend / compound
//! path, and orchestrates the external rewards, token, vault and
//! access-control collaborators in a fixed order so no operation can
//! leave a partial commit behind.
//!
//! Layering, leaves first:
//! - [`store::PositionStore`] — the append-only position arena and the
//!   owner indexes; knows nothing about rewards or vaults
//! - [`supply::SupplyAccountant`] — the working-supply aggregate and
//!   the capacity ceiling
//! - [`state::LedgerState`] — store + accountant plus the single
//!   ownership-change bookkeeping routine
//! - [`gate::AccessGate`] — pause / allow-list pass-through
//! - [`lifecycle::StakingLedger`] — the public operations

/// Ledger events, journaled after each committed operation.
pub mod events;
/// Pause and allow-list checks.
pub mod gate;
/// Public ledger operations.
pub mod lifecycle;
/// Prelude module for convenient imports.
pub mod prelude;
/// Shared ledger state and ownership-change bookkeeping.
pub mod state;
/// Position arena and owner indexes.
pub mod store;
/// Working-supply accounting.
pub mod supply;
