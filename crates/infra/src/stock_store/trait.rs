//! The persistence/transaction boundary contract.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockbook_core::{DomainResult, MovementId, ReservationId, StockCountId};
use stockbook_counts::StockCount;
use stockbook_ledger::{Direction, EntryKey, LedgerEntry, MovementRecord, MovementRequest};
use stockbook_reservations::{Reservation, ReservationOutcome};

/// Result of one committed movement: the journal record plus the entry state
/// it produced. The record's id doubles as the transaction id returned to
/// callers; the entry carries the new balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMovement {
    pub record: MovementRecord,
    pub entry: LedgerEntry,
}

/// Validate one request against an entry and produce the journal record plus
/// the next entry state. Shared by every backend so the semantics of a
/// movement never depend on the storage engine.
pub(crate) fn stage_movement(
    current: &LedgerEntry,
    request: &MovementRequest,
    now: DateTime<Utc>,
) -> DomainResult<AppliedMovement> {
    request.validate()?;
    let unit_cost_before = current.average_cost();
    let (next, delta) = current.with_movement(request.kind, request.quantity, request.unit_cost, now)?;

    // Cost at time of movement: supplied for inward, the running average for
    // outward (cost of goods consumed).
    let unit_cost = match request.kind.direction() {
        Direction::Inward => request.unit_cost,
        Direction::Outward => Some(unit_cost_before),
    };

    let record = MovementRecord {
        id: MovementId::new(),
        location: request.location,
        item: request.item,
        kind: request.kind,
        quantity: delta,
        uom: request.uom.clone(),
        unit_cost,
        balance_after: next.quantity_on_hand(),
        document: request.document.clone(),
        batch_id: request.batch_id,
        serial_id: request.serial_id,
        actor: request.actor,
        occurred_at: now,
        note: request.note.clone(),
    };

    Ok(AppliedMovement {
        record,
        entry: next,
    })
}

/// Storage boundary for ledger entries, the movement journal, reservations
/// and stock counts.
///
/// Every mutating method is one atomic unit of work: either all of its
/// effects are visible afterwards or none are, including under concurrent
/// callers against the same entry. Implementations serialize mutations per
/// store (in-memory: a single write lock; SQL: row locks inside one
/// transaction), which is what makes the journal's `balance_after` sequence
/// replayable.
///
/// Ownership discipline: on-hand quantity and cost fields change only through
/// `apply_movements`/`commit_count` (both share the movement-application
/// routine); `create_reservation`/`settle_reservation` are the only writers
/// of the reserved/available pair.
pub trait StockStore: Send + Sync {
    // ── ledger ────────────────────────────────────────────────────────────

    fn entry(&self, key: &EntryKey) -> DomainResult<Option<LedgerEntry>>;

    fn entries(&self) -> DomainResult<Vec<LedgerEntry>>;

    /// Apply a batch of movements atomically (all-or-nothing), lazily
    /// creating entries on first movement. A failure on any movement leaves
    /// every entry and the journal untouched.
    fn apply_movements(&self, requests: &[MovementRequest]) -> DomainResult<Vec<AppliedMovement>>;

    fn set_reorder_levels(
        &self,
        key: &EntryKey,
        reorder_point: Option<Decimal>,
        reorder_quantity: Option<Decimal>,
    ) -> DomainResult<LedgerEntry>;

    /// Journal rows for one entry, in application order.
    fn movements_for_entry(&self, key: &EntryKey) -> DomainResult<Vec<MovementRecord>>;

    /// Journal rows tagged to one source document, in application order.
    fn movements_for_document(
        &self,
        doc_type: &str,
        doc_id: Uuid,
    ) -> DomainResult<Vec<MovementRecord>>;

    // ── reservations ──────────────────────────────────────────────────────

    /// Persist an active reservation and move its quantity from available to
    /// reserved on the entry, in one transaction. Fails with
    /// `InsufficientStock` when available quantity is short and `NotFound`
    /// when the entry does not exist yet.
    fn create_reservation(&self, reservation: &Reservation) -> DomainResult<Reservation>;

    /// Settle an active reservation; for released/expired outcomes the
    /// unfulfilled quantity returns to available atomically with the status
    /// change.
    fn settle_reservation(
        &self,
        id: ReservationId,
        outcome: ReservationOutcome,
    ) -> DomainResult<Reservation>;

    fn reservation(&self, id: ReservationId) -> DomainResult<Option<Reservation>>;

    fn active_reservations(&self, key: &EntryKey) -> DomainResult<Vec<Reservation>>;

    /// Active reservations whose expiry deadline has passed.
    fn reservations_due(&self, now: DateTime<Utc>) -> DomainResult<Vec<Reservation>>;

    // ── stock counts ──────────────────────────────────────────────────────

    fn insert_count(&self, count: &StockCount) -> DomainResult<()>;

    /// Replace a stored header (and its owned lines). Fails with
    /// `StateConflict` when the stored version does not precede the incoming
    /// one (concurrent modification).
    fn update_count(&self, count: &StockCount) -> DomainResult<()>;

    /// Commit a post/revoke: apply the movements and replace the header in
    /// one transaction. Same version discipline as `update_count`.
    fn commit_count(
        &self,
        count: &StockCount,
        movements: &[MovementRequest],
    ) -> DomainResult<Vec<AppliedMovement>>;

    /// Hard-delete a draft header with its lines; `StateConflict` otherwise.
    fn delete_count(&self, id: StockCountId) -> DomainResult<StockCount>;

    fn count(&self, id: StockCountId) -> DomainResult<Option<StockCount>>;
}
