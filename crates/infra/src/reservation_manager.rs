//! Reservation service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use stockbook_auth::{Authorizer, Permission};
use stockbook_core::{
    ActorId, DocumentRef, DomainError, DomainResult, ItemId, LocationId, ReservationId,
};
use stockbook_ledger::EntryKey;
use stockbook_reservations::{Reservation, ReservationOutcome};

use crate::audit::{AuditEvent, AuditLog};
use crate::stock_store::StockStore;

/// Input for [`ReservationManager::reserve`].
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub location: LocationId,
    pub item: ItemId,
    pub quantity: Decimal,
    pub document: DocumentRef,
    pub expires_at: Option<DateTime<Utc>>,
    pub actor: ActorId,
}

/// Soft holds against available quantity.
///
/// Reserving never moves physical stock; it earmarks available quantity so
/// later claims see a reduced `quantity_available`. Settlement is terminal:
/// `released`/`expired` return the hold, `fulfilled` only flips status — the
/// physical issue arrives as a separate movement from the caller.
pub struct ReservationManager<S> {
    store: Arc<S>,
    authorizer: Arc<dyn Authorizer>,
    audit: Arc<dyn AuditLog>,
}

impl<S: StockStore> ReservationManager<S> {
    pub fn new(store: Arc<S>, authorizer: Arc<dyn Authorizer>, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            store,
            authorizer,
            audit,
        }
    }

    #[instrument(
        skip(self, request),
        fields(
            location = %request.location,
            item = %request.item,
            quantity = %request.quantity,
            actor = %request.actor
        ),
        err
    )]
    pub fn reserve(&self, request: &ReserveRequest) -> DomainResult<Reservation> {
        self.ensure_permitted(request.actor, &Permission::RESERVE)?;

        let now = Utc::now();
        let reservation = Reservation::new(
            ReservationId::new(),
            request.location,
            request.item,
            request.quantity,
            request.document.clone(),
            request.actor,
            request.expires_at,
            now,
        )?;

        let created = self.store.create_reservation(&reservation).inspect_err(|error| {
            warn!(%error, "reservation rejected");
        })?;

        info!(reservation_id = %created.reservation_id(), "reservation created");
        self.audit.record(
            AuditEvent::new(
                "reservation",
                created.reservation_id().into(),
                "create",
                request.actor,
            )
            .with_after(serde_json::json!({
                "quantity": created.quantity(),
                "document": created.document(),
                "expires_at": created.expires_at(),
            })),
        );
        Ok(created)
    }

    #[instrument(skip(self), fields(reservation_id = %id, outcome = outcome.as_str(), actor = %actor), err)]
    pub fn release(
        &self,
        id: ReservationId,
        outcome: ReservationOutcome,
        actor: ActorId,
    ) -> DomainResult<Reservation> {
        self.ensure_permitted(actor, &Permission::RELEASE)?;

        let settled = self.store.settle_reservation(id, outcome).inspect_err(|error| {
            warn!(%error, "reservation settlement rejected");
        })?;

        info!(status = settled.status().as_str(), "reservation settled");
        self.audit.record(
            AuditEvent::new("reservation", id.into(), outcome.as_str(), actor).with_after(
                serde_json::json!({
                    "status": settled.status().as_str(),
                    "quantity_fulfilled": settled.quantity_fulfilled(),
                }),
            ),
        );
        Ok(settled)
    }

    /// Expire every active reservation whose deadline has passed. Returns the
    /// reservations that were expired; individual failures abort the sweep.
    #[instrument(skip(self), fields(actor = %actor), err)]
    pub fn release_expired(
        &self,
        now: DateTime<Utc>,
        actor: ActorId,
    ) -> DomainResult<Vec<Reservation>> {
        self.ensure_permitted(actor, &Permission::RELEASE)?;

        let due = self.store.reservations_due(now)?;
        let mut expired = Vec::with_capacity(due.len());
        for reservation in due {
            let settled = self
                .store
                .settle_reservation(reservation.reservation_id(), ReservationOutcome::Expired)?;
            self.audit.record(AuditEvent::new(
                "reservation",
                settled.reservation_id().into(),
                "expire",
                actor,
            ));
            expired.push(settled);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired overdue reservations");
        }
        Ok(expired)
    }

    pub fn reservation(&self, id: ReservationId) -> DomainResult<Option<Reservation>> {
        self.store.reservation(id)
    }

    pub fn active_reservations_for(
        &self,
        location: LocationId,
        item: ItemId,
    ) -> DomainResult<Vec<Reservation>> {
        self.store.active_reservations(&EntryKey::new(location, item))
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
