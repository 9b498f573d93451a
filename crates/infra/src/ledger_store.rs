//! Movement application service.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{instrument, warn};
use uuid::Uuid;

use stockbook_core::{DomainResult, ItemId, LocationId};
use stockbook_ledger::{EntryKey, LedgerEntry, MovementRecord, MovementRequest};

use crate::audit::{AuditEvent, AuditLog};
use crate::stock_store::{AppliedMovement, StockStore};

/// The canonical write path to the stock ledger.
///
/// Every quantity or valuation change enters through [`apply_movement`]
/// (or its batch form): the store applies the movement atomically and this
/// service emits the audit trail. Reads pass straight through to the store.
///
/// [`apply_movement`]: LedgerStore::apply_movement
pub struct LedgerStore<S> {
    store: Arc<S>,
    audit: Arc<dyn AuditLog>,
}

impl<S: StockStore> LedgerStore<S> {
    pub fn new(store: Arc<S>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Apply one movement. The returned record's id is the transaction id;
    /// the returned entry carries the post-movement balances.
    #[instrument(
        skip(self, request),
        fields(
            location = %request.location,
            item = %request.item,
            kind = request.kind.as_str(),
            quantity = %request.quantity
        ),
        err
    )]
    pub fn apply_movement(&self, request: &MovementRequest) -> DomainResult<AppliedMovement> {
        let mut applied = self.apply_batch(std::slice::from_ref(request))?;
        // apply_batch returns exactly one element per request.
        applied.pop().ok_or_else(|| {
            stockbook_core::DomainError::persistence("store returned no applied movement")
        })
    }

    /// Apply several movements atomically: all of them commit or none do.
    pub fn apply_batch(&self, requests: &[MovementRequest]) -> DomainResult<Vec<AppliedMovement>> {
        let applied = self.store.apply_movements(requests).inspect_err(|error| {
            warn!(%error, batch_len = requests.len(), "movement batch rejected");
        })?;

        for movement in &applied {
            self.audit.record(
                AuditEvent::new(
                    "stock_movement",
                    movement.record.id.into(),
                    movement.record.kind.as_str(),
                    movement.record.actor,
                )
                .with_after(serde_json::json!({
                    "location": movement.record.location,
                    "item": movement.record.item,
                    "quantity": movement.record.quantity,
                    "balance_after": movement.record.balance_after,
                    "document": movement.record.document,
                })),
            );
        }
        Ok(applied)
    }

    pub fn entry(&self, location: LocationId, item: ItemId) -> DomainResult<Option<LedgerEntry>> {
        self.store.entry(&EntryKey::new(location, item))
    }

    pub fn movements_for_entry(
        &self,
        location: LocationId,
        item: ItemId,
    ) -> DomainResult<Vec<MovementRecord>> {
        self.store.movements_for_entry(&EntryKey::new(location, item))
    }

    pub fn movements_for_document(
        &self,
        doc_type: &str,
        doc_id: Uuid,
    ) -> DomainResult<Vec<MovementRecord>> {
        self.store.movements_for_document(doc_type, doc_id)
    }

    /// Entries whose available quantity has dropped below their reorder
    /// point. Entries without a configured reorder point never qualify.
    pub fn entries_below_reorder_point(&self) -> DomainResult<Vec<LedgerEntry>> {
        Ok(self
            .store
            .entries()?
            .into_iter()
            .filter(LedgerEntry::is_below_reorder_point)
            .collect())
    }

    pub fn set_reorder_levels(
        &self,
        location: LocationId,
        item: ItemId,
        reorder_point: Option<Decimal>,
        reorder_quantity: Option<Decimal>,
    ) -> DomainResult<LedgerEntry> {
        self.store
            .set_reorder_levels(&EntryKey::new(location, item), reorder_point, reorder_quantity)
    }
}
