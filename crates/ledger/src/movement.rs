//! Movement model: kinds, requests and journal records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    ActorId, BatchId, DocumentRef, DomainError, DomainResult, ItemId, LocationId, MovementId,
    SerialId, UnitOfMeasure,
};

/// Direction of a movement relative to the ledger entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inward,
    Outward,
}

/// Kind of stock movement.
///
/// The inward/outward classification is a fixed table; it is not configurable
/// and never depends on the quantity sign (requests always carry positive
/// magnitudes, the signed delta is derived).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Receipt,
    Issue,
    TransferOut,
    TransferIn,
    AdjustmentIn,
    AdjustmentOut,
    ReturnIn,
    ReturnOut,
    ProductionIn,
    ProductionOut,
}

impl MovementKind {
    pub fn direction(self) -> Direction {
        match self {
            Self::Receipt
            | Self::TransferIn
            | Self::AdjustmentIn
            | Self::ReturnIn
            | Self::ProductionIn => Direction::Inward,
            Self::Issue
            | Self::TransferOut
            | Self::AdjustmentOut
            | Self::ReturnOut
            | Self::ProductionOut => Direction::Outward,
        }
    }

    pub fn is_inward(self) -> bool {
        self.direction() == Direction::Inward
    }

    /// The opposite-direction kind, used when reversing a posted movement.
    pub fn inverse(self) -> Self {
        match self {
            Self::Receipt => Self::Issue,
            Self::Issue => Self::Receipt,
            Self::TransferOut => Self::TransferIn,
            Self::TransferIn => Self::TransferOut,
            Self::AdjustmentIn => Self::AdjustmentOut,
            Self::AdjustmentOut => Self::AdjustmentIn,
            Self::ReturnIn => Self::ReturnOut,
            Self::ReturnOut => Self::ReturnIn,
            Self::ProductionIn => Self::ProductionOut,
            Self::ProductionOut => Self::ProductionIn,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Receipt => "receipt",
            Self::Issue => "issue",
            Self::TransferOut => "transfer_out",
            Self::TransferIn => "transfer_in",
            Self::AdjustmentIn => "adjustment_in",
            Self::AdjustmentOut => "adjustment_out",
            Self::ReturnIn => "return_in",
            Self::ReturnOut => "return_out",
            Self::ProductionIn => "production_in",
            Self::ProductionOut => "production_out",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to apply one movement to a ledger entry.
///
/// `quantity` is a strictly positive magnitude; the signed delta is derived
/// from the kind's direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub location: LocationId,
    pub item: ItemId,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub uom: UnitOfMeasure,
    /// Unit cost for inward movements; drives weighted-average recomputation.
    pub unit_cost: Option<Decimal>,
    pub document: DocumentRef,
    pub batch_id: Option<BatchId>,
    pub serial_id: Option<SerialId>,
    pub actor: ActorId,
    pub note: Option<String>,
}

impl MovementRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(
                "movement quantity must be strictly positive",
            ));
        }
        if let Some(cost) = self.unit_cost {
            if cost < Decimal::ZERO {
                return Err(DomainError::validation("unit cost cannot be negative"));
            }
        }
        Ok(())
    }

    /// The delta this movement applies to on-hand quantity.
    pub fn signed_quantity(&self) -> Decimal {
        match self.kind.direction() {
            Direction::Inward => self.quantity,
            Direction::Outward => -self.quantity,
        }
    }
}

/// One journal row: a permanently recorded, directional change to a ledger
/// entry's on-hand quantity.
///
/// Records are immutable once written; corrections are made by posting a new,
/// opposite movement. `quantity` carries the signed delta and `balance_after`
/// snapshots the on-hand quantity immediately after the movement, so a
/// stream of records for one entry is replayable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub location: LocationId,
    pub item: ItemId,
    pub kind: MovementKind,
    /// Signed delta (negative for outward kinds).
    pub quantity: Decimal,
    pub uom: UnitOfMeasure,
    /// Cost at the time of the movement: the supplied unit cost for inward
    /// movements, the entry's average cost for outward ones.
    pub unit_cost: Option<Decimal>,
    /// On-hand quantity immediately after this movement.
    pub balance_after: Decimal,
    pub document: DocumentRef,
    pub batch_id: Option<BatchId>,
    pub serial_id: Option<SerialId>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
}
