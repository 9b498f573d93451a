//! Infrastructure for the stock ledger engine: the persistence boundary
//! ([`StockStore`] with in-memory and Postgres implementations), the three
//! public services ([`LedgerStore`], [`ReservationManager`],
//! [`StockCountService`]) and the audit/numbering collaborators.

pub mod audit;
pub mod count_service;
pub mod ledger_store;
pub mod numbering;
pub mod reservation_manager;
pub mod stock_store;

pub use audit::{AuditEvent, AuditLog, InMemoryAuditLog, TracingAuditLog};
pub use count_service::StockCountService;
pub use ledger_store::LedgerStore;
pub use numbering::{DocumentNumbering, InMemoryNumbering};
pub use reservation_manager::{ReservationManager, ReserveRequest};
pub use stock_store::{AppliedMovement, InMemoryStockStore, PostgresStockStore, StockStore};

#[cfg(test)]
mod integration_tests;
