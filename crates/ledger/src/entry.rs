//! The per-(location, item) quantity and valuation aggregate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, Entity, ItemId, LocationId};

use crate::movement::{Direction, MovementKind};

/// Key of a ledger entry: one aggregate per location × item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub location: LocationId,
    pub item: ItemId,
}

impl EntryKey {
    pub fn new(location: LocationId, item: ItemId) -> Self {
        Self { location, item }
    }
}

/// Aggregate record of current quantity and valuation for one item at one
/// location.
///
/// Entries are created lazily on first movement and never deleted. Fields are
/// private: state changes only through the transformation methods below, each
/// of which returns the next state and maintains the invariants
/// `quantity_available == quantity_on_hand - quantity_reserved`,
/// `quantity_on_hand >= 0` and `total_value == quantity_on_hand * average_cost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    key: EntryKey,
    quantity_on_hand: Decimal,
    quantity_reserved: Decimal,
    quantity_available: Decimal,
    average_cost: Decimal,
    total_value: Decimal,
    reorder_point: Option<Decimal>,
    reorder_quantity: Option<Decimal>,
    updated_at: DateTime<Utc>,
}

impl Entity for LedgerEntry {
    type Id = EntryKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }
}

impl LedgerEntry {
    /// Fresh, empty entry (lazy creation on first movement).
    pub fn new(key: EntryKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            quantity_on_hand: Decimal::ZERO,
            quantity_reserved: Decimal::ZERO,
            quantity_available: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            total_value: Decimal::ZERO,
            reorder_point: None,
            reorder_quantity: None,
            updated_at: at,
        }
    }

    pub fn key(&self) -> EntryKey {
        self.key
    }

    pub fn location(&self) -> LocationId {
        self.key.location
    }

    pub fn item(&self) -> ItemId {
        self.key.item
    }

    pub fn quantity_on_hand(&self) -> Decimal {
        self.quantity_on_hand
    }

    pub fn quantity_reserved(&self) -> Decimal {
        self.quantity_reserved
    }

    pub fn quantity_available(&self) -> Decimal {
        self.quantity_available
    }

    pub fn average_cost(&self) -> Decimal {
        self.average_cost
    }

    pub fn total_value(&self) -> Decimal {
        self.total_value
    }

    pub fn reorder_point(&self) -> Option<Decimal> {
        self.reorder_point
    }

    pub fn reorder_quantity(&self) -> Option<Decimal> {
        self.reorder_quantity
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_below_reorder_point(&self) -> bool {
        match self.reorder_point {
            Some(point) => self.quantity_available < point,
            None => false,
        }
    }

    /// Apply a movement, returning the next state and the signed delta.
    ///
    /// Inward movements with a supplied unit cost recompute the weighted
    /// average; outward movements never change `average_cost`. Fails with
    /// `InsufficientStock` when on-hand would go negative.
    pub fn with_movement(
        &self,
        kind: MovementKind,
        quantity: Decimal,
        unit_cost: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> DomainResult<(Self, Decimal)> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation(
                "movement quantity must be strictly positive",
            ));
        }

        let delta = match kind.direction() {
            Direction::Inward => quantity,
            Direction::Outward => -quantity,
        };
        let new_on_hand = self.quantity_on_hand + delta;
        if new_on_hand < Decimal::ZERO {
            return Err(DomainError::insufficient_stock(
                quantity,
                self.quantity_on_hand,
            ));
        }

        let average_cost = match (kind.direction(), unit_cost) {
            (Direction::Inward, Some(cost)) => {
                if new_on_hand > Decimal::ZERO {
                    (self.quantity_on_hand * self.average_cost + quantity * cost) / new_on_hand
                } else {
                    cost
                }
            }
            _ => self.average_cost,
        };

        let next = Self {
            quantity_on_hand: new_on_hand,
            quantity_available: new_on_hand - self.quantity_reserved,
            average_cost,
            total_value: new_on_hand * average_cost,
            updated_at: at,
            ..self.clone()
        };
        Ok((next, delta))
    }

    /// Earmark available quantity for a reservation.
    pub fn with_hold(&self, quantity: Decimal, at: DateTime<Utc>) -> DomainResult<Self> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation(
                "reservation quantity must be strictly positive",
            ));
        }
        if self.quantity_available < quantity {
            return Err(DomainError::insufficient_stock(
                quantity,
                self.quantity_available,
            ));
        }

        let reserved = self.quantity_reserved + quantity;
        Ok(Self {
            quantity_reserved: reserved,
            quantity_available: self.quantity_on_hand - reserved,
            updated_at: at,
            ..self.clone()
        })
    }

    /// Return earmarked quantity to available (reservation released/expired).
    pub fn with_hold_released(&self, quantity: Decimal, at: DateTime<Utc>) -> DomainResult<Self> {
        if quantity < Decimal::ZERO {
            return Err(DomainError::validation(
                "released quantity cannot be negative",
            ));
        }
        if quantity > self.quantity_reserved {
            return Err(DomainError::validation(format!(
                "cannot release {} of {} reserved",
                quantity, self.quantity_reserved
            )));
        }

        let reserved = self.quantity_reserved - quantity;
        Ok(Self {
            quantity_reserved: reserved,
            quantity_available: self.quantity_on_hand - reserved,
            updated_at: at,
            ..self.clone()
        })
    }

    /// Replace the reorder thresholds.
    pub fn with_reorder_levels(
        &self,
        reorder_point: Option<Decimal>,
        reorder_quantity: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            reorder_point,
            reorder_quantity,
            updated_at: at,
            ..self.clone()
        }
    }
}
