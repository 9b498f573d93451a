//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**; identity does
/// not matter, only the attribute values do. `DocumentRef { "sales_order",
/// <uuid>, "SO-2025-1001" }` is a value object; a `Reservation` with its
/// `ReservationId` is an entity.
///
/// To "modify" a value object, create a new one with the new values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
