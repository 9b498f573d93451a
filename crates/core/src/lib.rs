//! `stockbook-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the shared error taxonomy, and the small value
//! objects carried by ledger movements and documents.

pub mod document;
pub mod entity;
pub mod error;
pub mod id;
pub mod uom;
pub mod value_object;

pub use document::DocumentRef;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    ActorId, BatchId, ItemId, LocationId, MovementId, ReservationId, SerialId, StockCountId,
};
pub use uom::UnitOfMeasure;
pub use value_object::ValueObject;
