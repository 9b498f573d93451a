//! Reservation lifecycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    ActorId, DocumentRef, DomainError, DomainResult, Entity, ItemId, LocationId, ReservationId,
};

/// Lifecycle status. A reservation leaves `Active` exactly once.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Fulfilled,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Fulfilled => "fulfilled",
            Self::Released => "released",
            Self::Expired => "expired",
        }
    }
}

/// How an active reservation is settled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationOutcome {
    /// Stock was shipped/consumed; the physical decrement arrives as a
    /// separate issue movement orchestrated by the caller.
    Fulfilled,
    /// Claim withdrawn; the quantity returns to available.
    Released,
    /// Claim timed out; the quantity returns to available.
    Expired,
}

impl ReservationOutcome {
    pub fn status(self) -> ReservationStatus {
        match self {
            Self::Fulfilled => ReservationStatus::Fulfilled,
            Self::Released => ReservationStatus::Released,
            Self::Expired => ReservationStatus::Expired,
        }
    }

    /// Whether settling with this outcome returns the held quantity to
    /// available on the ledger entry.
    pub fn returns_hold(self) -> bool {
        matches!(self, Self::Released | Self::Expired)
    }

    pub fn as_str(self) -> &'static str {
        self.status().as_str()
    }
}

/// A soft hold against available quantity for a pending outbound document.
///
/// Invariant: `quantity_fulfilled <= quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    location: LocationId,
    item: ItemId,
    quantity: Decimal,
    quantity_fulfilled: Decimal,
    document: DocumentRef,
    status: ReservationStatus,
    expires_at: Option<DateTime<Utc>>,
    created_by: ActorId,
    created_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Reservation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ReservationId,
        location: LocationId,
        item: ItemId,
        quantity: Decimal,
        document: DocumentRef,
        created_by: ActorId,
        expires_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation(
                "reservation quantity must be strictly positive",
            ));
        }
        Ok(Self {
            id,
            location,
            item,
            quantity,
            quantity_fulfilled: Decimal::ZERO,
            document,
            status: ReservationStatus::Active,
            expires_at,
            created_by,
            created_at: at,
            settled_at: None,
        })
    }

    pub fn reservation_id(&self) -> ReservationId {
        self.id
    }

    pub fn location(&self) -> LocationId {
        self.location
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn quantity_fulfilled(&self) -> Decimal {
        self.quantity_fulfilled
    }

    /// Quantity still held against the ledger entry.
    pub fn unfulfilled_quantity(&self) -> Decimal {
        self.quantity - self.quantity_fulfilled
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn created_by(&self) -> ActorId {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.settled_at
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active
            && self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    /// Settle the reservation into a terminal status.
    ///
    /// Fails with `StateConflict` unless the reservation is currently active.
    /// Fulfillment records the full quantity as fulfilled; the corresponding
    /// physical issue is applied separately by the caller.
    pub fn settled(&self, outcome: ReservationOutcome, at: DateTime<Utc>) -> DomainResult<Self> {
        if self.status.is_terminal() {
            return Err(DomainError::state_conflict(format!(
                "reservation {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }

        let quantity_fulfilled = match outcome {
            ReservationOutcome::Fulfilled => self.quantity,
            ReservationOutcome::Released | ReservationOutcome::Expired => self.quantity_fulfilled,
        };
        Ok(Self {
            status: outcome.status(),
            quantity_fulfilled,
            settled_at: Some(at),
            ..self.clone()
        })
    }
}
