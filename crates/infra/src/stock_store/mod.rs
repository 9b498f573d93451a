//! Stock store abstraction and implementations.
//!
//! The store is the single transaction boundary of the engine: ledger
//! entries, the movement journal, reservations and stock counts commit
//! together or not at all. Two implementations are provided:
//!
//! - [`InMemoryStockStore`]: lock-based store for tests and development
//! - [`PostgresStockStore`]: persistent store backed by PostgreSQL

mod in_memory;
mod postgres;
mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use r#trait::{AppliedMovement, StockStore};
