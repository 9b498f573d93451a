//! Stock count reconciliation service.
//!
//! Drives the count state machine (`draft → in_progress → completed →
//! cancelled`, plus `draft → deleted`) and turns counted variances into
//! ledger adjustments through the canonical movement path. Posting and
//! revoking are each one store transaction: the adjustment (or reversal)
//! movements and the header transition commit together.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use stockbook_auth::{Authorizer, Permission};
use stockbook_core::{ActorId, DomainError, DomainResult, LocationId, StockCountId};
use stockbook_counts::{CountLineSeed, CountLineUpdate, StockCount, StockCountLine};
use stockbook_ledger::EntryKey;

use crate::audit::{AuditEvent, AuditLog};
use crate::numbering::DocumentNumbering;
use crate::stock_store::StockStore;

pub struct StockCountService<S> {
    store: Arc<S>,
    authorizer: Arc<dyn Authorizer>,
    audit: Arc<dyn AuditLog>,
    numbering: Arc<dyn DocumentNumbering>,
}

impl<S: StockStore> StockCountService<S> {
    pub fn new(
        store: Arc<S>,
        authorizer: Arc<dyn Authorizer>,
        audit: Arc<dyn AuditLog>,
        numbering: Arc<dyn DocumentNumbering>,
    ) -> Self {
        Self {
            store,
            authorizer,
            audit,
            numbering,
        }
    }

    /// Create a draft count, snapshotting `system_qty` from the ledger for
    /// each seeded line. Items without a ledger entry snapshot as zero.
    #[instrument(skip(self, seeds), fields(location = %location, line_count = seeds.len(), actor = %actor), err)]
    pub fn create_count(
        &self,
        location: LocationId,
        seeds: &[CountLineSeed],
        actor: ActorId,
    ) -> DomainResult<StockCount> {
        self.ensure_permitted(actor, &Permission::COUNT_CREATE)?;

        let now = Utc::now();
        let mut lines = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let system_qty = self
                .store
                .entry(&EntryKey::new(location, seed.item))?
                .map(|entry| entry.quantity_on_hand())
                .unwrap_or_default();
            lines.push(StockCountLine::seeded(seed.item, seed.uom.clone(), system_qty));
        }

        let number = self.numbering.next_number("stock_count", "CNT")?;
        let count = StockCount::new(StockCountId::new(), location, number, now, lines, actor, now);
        self.store.insert_count(&count)?;

        info!(count = count.number(), "stock count created");
        self.audit.record(
            AuditEvent::new("stock_count", count.count_id().into(), "create", actor).with_after(
                serde_json::json!({
                    "number": count.number(),
                    "line_count": count.lines().len(),
                }),
            ),
        );
        Ok(count)
    }

    /// Record physical quantities; the header moves to `in_progress`.
    #[instrument(skip(self, updates), fields(count_id = %id, update_count = updates.len(), actor = %actor), err)]
    pub fn update_count(
        &self,
        id: StockCountId,
        updates: &[CountLineUpdate],
        actor: ActorId,
    ) -> DomainResult<StockCount> {
        self.ensure_permitted(actor, &Permission::COUNT_UPDATE)?;

        let count = self.load(id)?;
        let updated = count.with_counted(updates, Utc::now())?;
        self.store.update_count(&updated)?;

        self.audit.record(
            AuditEvent::new("stock_count", id.into(), "update", actor).with_after(
                serde_json::json!({
                    "status": updated.status().as_str(),
                    "variance_line_count": updated.variance_line_count(),
                }),
            ),
        );
        Ok(updated)
    }

    /// Post a count: apply one adjustment per counted line with nonzero
    /// variance and complete the header, all in one transaction. Returns the
    /// posted header and the number of variance lines applied; a count whose
    /// lines all match posts cleanly with zero adjustments.
    #[instrument(skip(self), fields(count_id = %id, actor = %actor), err)]
    pub fn post_count(&self, id: StockCountId, actor: ActorId) -> DomainResult<(StockCount, usize)> {
        self.ensure_permitted(actor, &Permission::COUNT_POST)?;

        let count = self.load(id)?;
        let adjustments = count.adjustment_requests(actor);
        let posted = count.posted(Utc::now())?;

        if let Err(error) = self.store.commit_count(&posted, &adjustments) {
            warn!(%error, count = count.number(), "stock count post failed");
            self.audit.record(
                AuditEvent::new("stock_count", id.into(), "post_failed", actor)
                    .with_reason(error.to_string()),
            );
            return Err(error);
        }

        info!(
            count = posted.number(),
            adjustments = adjustments.len(),
            "stock count posted"
        );
        self.audit.record(
            AuditEvent::new("stock_count", id.into(), "post", actor).with_after(
                serde_json::json!({
                    "number": posted.number(),
                    "adjustment_count": adjustments.len(),
                }),
            ),
        );
        Ok((posted, adjustments.len()))
    }

    /// Reverse a posted count: apply the inverse of every movement the post
    /// produced, tagged to the revocation document, and cancel the header in
    /// one transaction. Nets the ledger back to its pre-post state.
    #[instrument(skip(self), fields(count_id = %id, actor = %actor), err)]
    pub fn revoke_count(
        &self,
        id: StockCountId,
        reason: &str,
        actor: ActorId,
    ) -> DomainResult<StockCount> {
        self.ensure_permitted(actor, &Permission::COUNT_REVOKE)?;

        let count = self.load(id)?;
        let posted_movements = self
            .store
            .movements_for_document("stock_count", id.into())?;
        let reversals = count.reversal_requests(&posted_movements, actor);
        let revoked = count.revoked(Utc::now())?;

        if let Err(error) = self.store.commit_count(&revoked, &reversals) {
            warn!(%error, count = count.number(), "stock count revoke failed");
            self.audit.record(
                AuditEvent::new("stock_count", id.into(), "revoke_failed", actor)
                    .with_reason(error.to_string()),
            );
            return Err(error);
        }

        info!(
            count = revoked.number(),
            reversals = reversals.len(),
            "stock count revoked"
        );
        self.audit.record(
            AuditEvent::new("stock_count", id.into(), "revoke", actor)
                .with_reason(reason)
                .with_after(serde_json::json!({
                    "number": revoked.number(),
                    "reversal_count": reversals.len(),
                })),
        );
        Ok(revoked)
    }

    /// Hard-delete a draft count with its lines.
    #[instrument(skip(self), fields(count_id = %id, actor = %actor), err)]
    pub fn delete_count(&self, id: StockCountId, actor: ActorId) -> DomainResult<()> {
        self.ensure_permitted(actor, &Permission::COUNT_DELETE)?;

        let deleted = self.store.delete_count(id)?;
        info!(count = deleted.number(), "stock count deleted");
        self.audit.record(
            AuditEvent::new("stock_count", id.into(), "delete", actor)
                .with_before(serde_json::json!({ "number": deleted.number() })),
        );
        Ok(())
    }

    pub fn count(&self, id: StockCountId) -> DomainResult<Option<StockCount>> {
        self.store.count(id)
    }

    fn load(&self, id: StockCountId) -> DomainResult<StockCount> {
        self.store
            .count(id)?
            .ok_or_else(|| DomainError::not_found(format!("stock count {id}")))
    }

    fn ensure_permitted(&self, actor: ActorId, permission: &Permission) -> DomainResult<()> {
        if self.authorizer.check_permission(&actor, permission) {
            Ok(())
        } else {
            Err(DomainError::unauthorized(format!(
                "actor {actor} lacks permission '{permission}'"
            )))
        }
    }
}
