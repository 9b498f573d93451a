//! In-memory transactional stock store.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use stockbook_core::{DomainError, DomainResult, ReservationId, StockCountId};
use stockbook_counts::StockCount;
use stockbook_ledger::{EntryKey, LedgerEntry, MovementRecord, MovementRequest};
use stockbook_reservations::{Reservation, ReservationOutcome};

use super::r#trait::{stage_movement, AppliedMovement, StockStore};

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<EntryKey, LedgerEntry>,
    journal: Vec<MovementRecord>,
    reservations: HashMap<ReservationId, Reservation>,
    counts: HashMap<StockCountId, StockCount>,
}

/// In-memory stock store.
///
/// Intended for tests/dev and as the reference semantics for real backends.
/// One `RwLock` guards the whole state, so every mutating method is a single
/// serialized transaction: staging happens on copies and nothing is written
/// back until the whole batch has validated, which gives the all-or-nothing
/// guarantee without explicit rollback.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: RwLock<StoreState>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and compute a batch against current state without mutating
    /// it. Returns the updated entries and the journal rows to append.
    fn stage_movements(
        state: &StoreState,
        requests: &[MovementRequest],
        now: DateTime<Utc>,
    ) -> DomainResult<(HashMap<EntryKey, LedgerEntry>, Vec<AppliedMovement>)> {
        let mut staged: HashMap<EntryKey, LedgerEntry> = HashMap::new();
        let mut applied = Vec::with_capacity(requests.len());

        for request in requests {
            let key = EntryKey::new(request.location, request.item);
            let current = staged
                .get(&key)
                .cloned()
                .or_else(|| state.entries.get(&key).cloned())
                .unwrap_or_else(|| LedgerEntry::new(key, now));

            let movement = stage_movement(&current, request, now)?;
            staged.insert(key, movement.entry.clone());
            applied.push(movement);
        }

        Ok((staged, applied))
    }

    fn commit_staged(
        state: &mut StoreState,
        staged: HashMap<EntryKey, LedgerEntry>,
        applied: &[AppliedMovement],
    ) {
        state.entries.extend(staged);
        state
            .journal
            .extend(applied.iter().map(|a| a.record.clone()));
    }

    fn write_state(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| DomainError::persistence("stock store lock poisoned"))
    }

    fn read_state(&self) -> DomainResult<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| DomainError::persistence("stock store lock poisoned"))
    }

    fn check_count_version(stored: &StockCount, incoming: &StockCount) -> DomainResult<()> {
        if incoming.version() != stored.version() + 1 {
            return Err(DomainError::state_conflict(format!(
                "count {} was modified concurrently (stored version {}, incoming {})",
                stored.number(),
                stored.version(),
                incoming.version()
            )));
        }
        Ok(())
    }
}

impl StockStore for InMemoryStockStore {
    fn entry(&self, key: &EntryKey) -> DomainResult<Option<LedgerEntry>> {
        Ok(self.read_state()?.entries.get(key).cloned())
    }

    fn entries(&self) -> DomainResult<Vec<LedgerEntry>> {
        Ok(self.read_state()?.entries.values().cloned().collect())
    }

    fn apply_movements(&self, requests: &[MovementRequest]) -> DomainResult<Vec<AppliedMovement>> {
        if requests.is_empty() {
            return Ok(vec![]);
        }
        let mut state = self.write_state()?;
        let (staged, applied) = Self::stage_movements(&state, requests, Utc::now())?;
        Self::commit_staged(&mut state, staged, &applied);
        Ok(applied)
    }

    fn set_reorder_levels(
        &self,
        key: &EntryKey,
        reorder_point: Option<Decimal>,
        reorder_quantity: Option<Decimal>,
    ) -> DomainResult<LedgerEntry> {
        let mut state = self.write_state()?;
        let now = Utc::now();
        let entry = state
            .entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| LedgerEntry::new(*key, now));
        let next = entry.with_reorder_levels(reorder_point, reorder_quantity, now);
        state.entries.insert(*key, next.clone());
        Ok(next)
    }

    fn movements_for_entry(&self, key: &EntryKey) -> DomainResult<Vec<MovementRecord>> {
        Ok(self
            .read_state()?
            .journal
            .iter()
            .filter(|r| r.location == key.location && r.item == key.item)
            .cloned()
            .collect())
    }

    fn movements_for_document(
        &self,
        doc_type: &str,
        doc_id: Uuid,
    ) -> DomainResult<Vec<MovementRecord>> {
        Ok(self
            .read_state()?
            .journal
            .iter()
            .filter(|r| r.document.doc_type == doc_type && r.document.doc_id == doc_id)
            .cloned()
            .collect())
    }

    fn create_reservation(&self, reservation: &Reservation) -> DomainResult<Reservation> {
        let mut state = self.write_state()?;
        let id = reservation.reservation_id();
        if state.reservations.contains_key(&id) {
            return Err(DomainError::state_conflict(format!(
                "reservation {id} already exists"
            )));
        }

        let key = EntryKey::new(reservation.location(), reservation.item());
        let entry = state.entries.get(&key).cloned().ok_or_else(|| {
            DomainError::not_found(format!(
                "no ledger entry for item {} at location {}",
                key.item, key.location
            ))
        })?;

        let held = entry.with_hold(reservation.quantity(), Utc::now())?;
        state.entries.insert(key, held);
        state.reservations.insert(id, reservation.clone());
        Ok(reservation.clone())
    }

    fn settle_reservation(
        &self,
        id: ReservationId,
        outcome: ReservationOutcome,
    ) -> DomainResult<Reservation> {
        let mut state = self.write_state()?;
        let now = Utc::now();
        let reservation = state
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("reservation {id}")))?;

        let settled = reservation.settled(outcome, now)?;

        if outcome.returns_hold() {
            let key = EntryKey::new(reservation.location(), reservation.item());
            let entry = state.entries.get(&key).cloned().ok_or_else(|| {
                DomainError::persistence(format!(
                    "reservation {id} references a missing ledger entry"
                ))
            })?;
            let released = entry.with_hold_released(reservation.unfulfilled_quantity(), now)?;
            state.entries.insert(key, released);
        }

        state.reservations.insert(id, settled.clone());
        Ok(settled)
    }

    fn reservation(&self, id: ReservationId) -> DomainResult<Option<Reservation>> {
        Ok(self.read_state()?.reservations.get(&id).cloned())
    }

    fn active_reservations(&self, key: &EntryKey) -> DomainResult<Vec<Reservation>> {
        Ok(self
            .read_state()?
            .reservations
            .values()
            .filter(|r| {
                !r.status().is_terminal()
                    && r.location() == key.location
                    && r.item() == key.item
            })
            .cloned()
            .collect())
    }

    fn reservations_due(&self, now: DateTime<Utc>) -> DomainResult<Vec<Reservation>> {
        Ok(self
            .read_state()?
            .reservations
            .values()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect())
    }

    fn insert_count(&self, count: &StockCount) -> DomainResult<()> {
        let mut state = self.write_state()?;
        let id = count.count_id();
        if state.counts.contains_key(&id) {
            return Err(DomainError::state_conflict(format!(
                "count {} already exists",
                count.number()
            )));
        }
        state.counts.insert(id, count.clone());
        Ok(())
    }

    fn update_count(&self, count: &StockCount) -> DomainResult<()> {
        let mut state = self.write_state()?;
        let id = count.count_id();
        let stored = state
            .counts
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("stock count {id}")))?;
        Self::check_count_version(stored, count)?;
        state.counts.insert(id, count.clone());
        Ok(())
    }

    fn commit_count(
        &self,
        count: &StockCount,
        movements: &[MovementRequest],
    ) -> DomainResult<Vec<AppliedMovement>> {
        let mut state = self.write_state()?;
        let id = count.count_id();
        let stored = state
            .counts
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("stock count {id}")))?;
        Self::check_count_version(stored, count)?;

        let (staged, applied) = Self::stage_movements(&state, movements, Utc::now())?;
        Self::commit_staged(&mut state, staged, &applied);
        state.counts.insert(id, count.clone());
        Ok(applied)
    }

    fn delete_count(&self, id: StockCountId) -> DomainResult<StockCount> {
        let mut state = self.write_state()?;
        let stored = state
            .counts
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("stock count {id}")))?;
        // Re-checked under the lock; the service-level check can race.
        stored.ensure_deletable()?;
        state.counts.remove(&id);
        Ok(stored)
    }

    fn count(&self, id: StockCountId) -> DomainResult<Option<StockCount>> {
        Ok(self.read_state()?.counts.get(&id).cloned())
    }
}
