//! Ledger domain module.
//!
//! This crate contains the business rules of the stock ledger, implemented
//! purely as deterministic domain logic (no IO, no storage): the per
//! (location, item) quantity/valuation aggregate and the movement model
//! recorded in the append-only journal.

pub mod entry;
pub mod movement;

pub use entry::{EntryKey, LedgerEntry};
pub use movement::{Direction, MovementKind, MovementRecord, MovementRequest};
