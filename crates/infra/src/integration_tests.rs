//! End-to-end tests wiring the services against the in-memory store.

use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use stockbook_auth::{AllowAll, Permission, PolicyAuthorizer};
use stockbook_core::{ActorId, DocumentRef, DomainError, ItemId, LocationId, UnitOfMeasure};
use stockbook_counts::{CountLineSeed, CountLineUpdate, CountStatus};
use stockbook_ledger::{MovementKind, MovementRequest};
use stockbook_reservations::{ReservationOutcome, ReservationStatus};

use crate::{
    InMemoryAuditLog, InMemoryNumbering, InMemoryStockStore, LedgerStore, ReservationManager,
    ReserveRequest, StockCountService,
};

struct Harness {
    audit: Arc<InMemoryAuditLog>,
    ledger: LedgerStore<InMemoryStockStore>,
    reservations: ReservationManager<InMemoryStockStore>,
    counts: StockCountService<InMemoryStockStore>,
    actor: ActorId,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStockStore::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let authorizer = Arc::new(AllowAll);
    let numbering = Arc::new(InMemoryNumbering::new());

    Harness {
        ledger: LedgerStore::new(store.clone(), audit.clone()),
        reservations: ReservationManager::new(store.clone(), authorizer.clone(), audit.clone()),
        counts: StockCountService::new(store, authorizer, audit.clone(), numbering),
        audit,
        actor: ActorId::new(),
    }
}

fn receipt(
    location: LocationId,
    item: ItemId,
    quantity: i64,
    unit_cost: i64,
    actor: ActorId,
) -> MovementRequest {
    MovementRequest {
        location,
        item,
        kind: MovementKind::Receipt,
        quantity: Decimal::from(quantity),
        uom: UnitOfMeasure::each(),
        unit_cost: Some(Decimal::from(unit_cost)),
        document: DocumentRef::new("purchase_receipt", Uuid::now_v7(), "PR-2025-1001"),
        batch_id: None,
        serial_id: None,
        actor,
        note: None,
    }
}

fn issue(location: LocationId, item: ItemId, quantity: i64, actor: ActorId) -> MovementRequest {
    MovementRequest {
        location,
        item,
        kind: MovementKind::Issue,
        quantity: Decimal::from(quantity),
        uom: UnitOfMeasure::each(),
        unit_cost: None,
        document: DocumentRef::new("delivery_note", Uuid::now_v7(), "DN-2025-1001"),
        batch_id: None,
        serial_id: None,
        actor,
        note: None,
    }
}

#[test]
fn receipts_blend_weighted_average_cost() {
    let h = harness();
    let (location, item) = (LocationId::new(), ItemId::new());

    h.ledger
        .apply_movement(&receipt(location, item, 100, 10, h.actor))
        .unwrap();
    let applied = h
        .ledger
        .apply_movement(&receipt(location, item, 100, 20, h.actor))
        .unwrap();

    assert_eq!(applied.entry.quantity_on_hand(), Decimal::from(200));
    assert_eq!(applied.entry.average_cost(), Decimal::from(15));
    assert_eq!(applied.entry.total_value(), Decimal::from(3000));
}

#[test]
fn count_post_and_revoke_round_trip() {
    let h = harness();
    let (location, item) = (LocationId::new(), ItemId::new());
    h.ledger
        .apply_movement(&receipt(location, item, 50, 10, h.actor))
        .unwrap();

    let count = h
        .counts
        .create_count(
            location,
            &[CountLineSeed {
                item,
                uom: UnitOfMeasure::each(),
            }],
            h.actor,
        )
        .unwrap();
    assert_eq!(count.status(), CountStatus::Draft);
    assert_eq!(count.lines()[0].system_qty, Decimal::from(50));
    assert!(count.number().starts_with("CNT-"));

    let count_id = count.count_id();
    let updated = h
        .counts
        .update_count(
            count_id,
            &[CountLineUpdate {
                item,
                counted_qty: Decimal::from(45),
            }],
            h.actor,
        )
        .unwrap();
    assert_eq!(updated.status(), CountStatus::InProgress);

    let (posted, adjustments) = h.counts.post_count(count_id, h.actor).unwrap();
    assert_eq!(adjustments, 1);
    assert_eq!(posted.status(), CountStatus::Completed);
    assert!(posted.is_posted());

    // One adjustment_out of 5 units tagged to the count.
    let movements = h
        .ledger
        .movements_for_document("stock_count", count_id.into())
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].kind, MovementKind::AdjustmentOut);
    assert_eq!(movements[0].quantity, Decimal::from(-5));
    assert_eq!(movements[0].document.doc_number, posted.number());

    let entry = h.ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(entry.quantity_on_hand(), Decimal::from(45));

    // Posting is not repeatable.
    assert!(matches!(
        h.counts.post_count(count_id, h.actor),
        Err(DomainError::StateConflict(_))
    ));

    // Revoking restores the pre-post balance and cancels the header.
    let revoked = h.counts.revoke_count(count_id, "miscount", h.actor).unwrap();
    assert_eq!(revoked.status(), CountStatus::Cancelled);

    let entry = h.ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(entry.quantity_on_hand(), Decimal::from(50));

    let reversals = h
        .ledger
        .movements_for_document("stock_count_revocation", count_id.into())
        .unwrap();
    assert_eq!(reversals.len(), 1);
    assert_eq!(reversals[0].kind, MovementKind::AdjustmentIn);
    assert_eq!(
        reversals[0].document.doc_number,
        format!("{}-REV", revoked.number())
    );

    // Querying by the original count still returns only the post movements.
    let originals = h
        .ledger
        .movements_for_document("stock_count", count_id.into())
        .unwrap();
    assert_eq!(originals.len(), 1);
}

#[test]
fn zero_variance_count_posts_without_adjustments() {
    let h = harness();
    let (location, item) = (LocationId::new(), ItemId::new());
    h.ledger
        .apply_movement(&receipt(location, item, 20, 5, h.actor))
        .unwrap();

    let count = h
        .counts
        .create_count(
            location,
            &[CountLineSeed {
                item,
                uom: UnitOfMeasure::each(),
            }],
            h.actor,
        )
        .unwrap();
    h.counts
        .update_count(
            count.count_id(),
            &[CountLineUpdate {
                item,
                counted_qty: Decimal::from(20),
            }],
            h.actor,
        )
        .unwrap();

    let (posted, adjustments) = h.counts.post_count(count.count_id(), h.actor).unwrap();
    assert_eq!(adjustments, 0);
    assert!(posted.is_posted());
    assert_eq!(
        h.ledger
            .movements_for_document("stock_count", count.count_id().into())
            .unwrap()
            .len(),
        0
    );
    let entry = h.ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(entry.quantity_on_hand(), Decimal::from(20));
}

#[test]
fn revoke_nets_multi_line_variances_to_zero() {
    let h = harness();
    let location = LocationId::new();
    let (short, over) = (ItemId::new(), ItemId::new());
    h.ledger
        .apply_movement(&receipt(location, short, 30, 2, h.actor))
        .unwrap();
    h.ledger
        .apply_movement(&receipt(location, over, 10, 3, h.actor))
        .unwrap();

    let count = h
        .counts
        .create_count(
            location,
            &[
                CountLineSeed {
                    item: short,
                    uom: UnitOfMeasure::each(),
                },
                CountLineSeed {
                    item: over,
                    uom: UnitOfMeasure::each(),
                },
            ],
            h.actor,
        )
        .unwrap();
    h.counts
        .update_count(
            count.count_id(),
            &[
                CountLineUpdate {
                    item: short,
                    counted_qty: Decimal::from(27),
                },
                CountLineUpdate {
                    item: over,
                    counted_qty: Decimal::from(14),
                },
            ],
            h.actor,
        )
        .unwrap();

    let (_, adjustments) = h.counts.post_count(count.count_id(), h.actor).unwrap();
    assert_eq!(adjustments, 2);
    assert_eq!(
        h.ledger.entry(location, short).unwrap().unwrap().quantity_on_hand(),
        Decimal::from(27)
    );
    assert_eq!(
        h.ledger.entry(location, over).unwrap().unwrap().quantity_on_hand(),
        Decimal::from(14)
    );

    h.counts
        .revoke_count(count.count_id(), "audit finding", h.actor)
        .unwrap();
    assert_eq!(
        h.ledger.entry(location, short).unwrap().unwrap().quantity_on_hand(),
        Decimal::from(30)
    );
    assert_eq!(
        h.ledger.entry(location, over).unwrap().unwrap().quantity_on_hand(),
        Decimal::from(10)
    );
}

#[test]
fn failed_post_leaves_ledger_untouched_and_audits_the_reason() {
    let h = harness();
    let (location, item) = (LocationId::new(), ItemId::new());
    h.ledger
        .apply_movement(&receipt(location, item, 50, 10, h.actor))
        .unwrap();

    let count = h
        .counts
        .create_count(
            location,
            &[CountLineSeed {
                item,
                uom: UnitOfMeasure::each(),
            }],
            h.actor,
        )
        .unwrap();
    h.counts
        .update_count(
            count.count_id(),
            &[CountLineUpdate {
                item,
                counted_qty: Decimal::from(45),
            }],
            h.actor,
        )
        .unwrap();

    // Stock leaves between counting and posting; the 5-unit adjustment_out
    // now overdraws the entry.
    h.ledger
        .apply_movement(&issue(location, item, 48, h.actor))
        .unwrap();

    let err = h.counts.post_count(count.count_id(), h.actor).unwrap_err();
    assert!(matches!(err, DomainError::InsufficientStock { .. }));

    // No partial effect: balance unchanged, nothing journaled to the count,
    // header neither posted nor advanced.
    let entry = h.ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(entry.quantity_on_hand(), Decimal::from(2));
    assert!(
        h.ledger
            .movements_for_document("stock_count", count.count_id().into())
            .unwrap()
            .is_empty()
    );
    let stored = h.counts.count(count.count_id()).unwrap().unwrap();
    assert_eq!(stored.status(), CountStatus::InProgress);
    assert!(!stored.is_posted());

    // The failure itself is audited with its reason.
    let failed = h
        .audit
        .events()
        .into_iter()
        .find(|e| e.action == "post_failed")
        .unwrap();
    assert!(failed.reason.as_deref().unwrap().contains("insufficient stock"));

    // The header is still editable: a corrected recount posts cleanly.
    // Variance stays relative to the seeded snapshot of 50, so counting 48
    // yields an adjustment_out of 2 against the remaining on-hand of 2.
    h.counts
        .update_count(
            count.count_id(),
            &[CountLineUpdate {
                item,
                counted_qty: Decimal::from(48),
            }],
            h.actor,
        )
        .unwrap();
    let (posted, adjustments) = h.counts.post_count(count.count_id(), h.actor).unwrap();
    assert!(posted.is_posted());
    assert_eq!(adjustments, 1);
    let entry = h.ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(entry.quantity_on_hand(), Decimal::ZERO);
}

#[test]
fn draft_count_can_be_deleted_but_posted_cannot() {
    let h = harness();
    let location = LocationId::new();

    let draft = h.counts.create_count(location, &[], h.actor).unwrap();
    h.counts.delete_count(draft.count_id(), h.actor).unwrap();
    assert!(h.counts.count(draft.count_id()).unwrap().is_none());

    let posted = h.counts.create_count(location, &[], h.actor).unwrap();
    h.counts.post_count(posted.count_id(), h.actor).unwrap();
    assert!(matches!(
        h.counts.delete_count(posted.count_id(), h.actor),
        Err(DomainError::StateConflict(_))
    ));
}

#[test]
fn reserve_holds_available_and_release_restores_it() {
    let h = harness();
    let (location, item) = (LocationId::new(), ItemId::new());
    h.ledger
        .apply_movement(&receipt(location, item, 10, 1, h.actor))
        .unwrap();

    let reservation = h
        .reservations
        .reserve(&ReserveRequest {
            location,
            item,
            quantity: Decimal::from(4),
            document: DocumentRef::new("sales_order", Uuid::now_v7(), "SO-2025-1001"),
            expires_at: None,
            actor: h.actor,
        })
        .unwrap();

    let entry = h.ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(entry.quantity_reserved(), Decimal::from(4));
    assert_eq!(entry.quantity_available(), Decimal::from(6));
    assert_eq!(entry.quantity_on_hand(), Decimal::from(10));

    // A second claim larger than what remains available is refused even
    // though on-hand would cover it.
    let err = h
        .reservations
        .reserve(&ReserveRequest {
            location,
            item,
            quantity: Decimal::from(7),
            document: DocumentRef::new("sales_order", Uuid::now_v7(), "SO-2025-1002"),
            expires_at: None,
            actor: h.actor,
        })
        .unwrap_err();
    assert!(matches!(err, DomainError::InsufficientStock { .. }));

    let released = h
        .reservations
        .release(reservation.reservation_id(), ReservationOutcome::Released, h.actor)
        .unwrap();
    assert_eq!(released.status(), ReservationStatus::Released);

    let entry = h.ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(entry.quantity_reserved(), Decimal::ZERO);
    assert_eq!(entry.quantity_available(), Decimal::from(10));

    // Settlement is terminal.
    assert!(matches!(
        h.reservations.release(
            reservation.reservation_id(),
            ReservationOutcome::Fulfilled,
            h.actor
        ),
        Err(DomainError::StateConflict(_))
    ));
}

#[test]
fn expiry_sweep_settles_only_overdue_reservations() {
    let h = harness();
    let (location, item) = (LocationId::new(), ItemId::new());
    h.ledger
        .apply_movement(&receipt(location, item, 10, 1, h.actor))
        .unwrap();

    let now = Utc::now();
    let overdue = h
        .reservations
        .reserve(&ReserveRequest {
            location,
            item,
            quantity: Decimal::from(3),
            document: DocumentRef::new("sales_order", Uuid::now_v7(), "SO-2025-1003"),
            expires_at: Some(now - Duration::minutes(5)),
            actor: h.actor,
        })
        .unwrap();
    let open_ended = h
        .reservations
        .reserve(&ReserveRequest {
            location,
            item,
            quantity: Decimal::from(2),
            document: DocumentRef::new("sales_order", Uuid::now_v7(), "SO-2025-1004"),
            expires_at: None,
            actor: h.actor,
        })
        .unwrap();

    let expired = h.reservations.release_expired(now, h.actor).unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].reservation_id(), overdue.reservation_id());

    let entry = h.ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(entry.quantity_reserved(), Decimal::from(2));
    assert_eq!(
        h.reservations
            .active_reservations_for(location, item)
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        h.reservations
            .reservation(open_ended.reservation_id())
            .unwrap()
            .unwrap()
            .status(),
        ReservationStatus::Active
    );
}

#[test]
fn journal_replay_reproduces_on_hand() {
    let h = harness();
    let (location, item) = (LocationId::new(), ItemId::new());

    h.ledger
        .apply_movement(&receipt(location, item, 100, 10, h.actor))
        .unwrap();
    h.ledger
        .apply_movement(&issue(location, item, 30, h.actor))
        .unwrap();
    h.ledger
        .apply_movement(&receipt(location, item, 25, 12, h.actor))
        .unwrap();
    h.ledger
        .apply_movement(&issue(location, item, 40, h.actor))
        .unwrap();

    let movements = h.ledger.movements_for_entry(location, item).unwrap();
    let mut running = Decimal::ZERO;
    for record in &movements {
        running += record.quantity;
        assert_eq!(record.balance_after, running);
    }

    let entry = h.ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(running, entry.quantity_on_hand());
    assert_eq!(entry.quantity_on_hand(), Decimal::from(55));
}

#[test]
fn concurrent_issues_admit_exactly_one_winner() {
    let h = harness();
    let (location, item) = (LocationId::new(), ItemId::new());
    h.ledger
        .apply_movement(&receipt(location, item, 10, 1, h.actor))
        .unwrap();

    let ledger = Arc::new(h.ledger);
    let results: Vec<_> = [h.actor, h.actor]
        .map(|actor| {
            let ledger = ledger.clone();
            thread::spawn(move || ledger.apply_movement(&issue(location, item, 6, actor)))
        })
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let shortfalls = results
        .iter()
        .filter(|r| matches!(r, Err(DomainError::InsufficientStock { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(shortfalls, 1);

    let entry = ledger.entry(location, item).unwrap().unwrap();
    assert_eq!(entry.quantity_on_hand(), Decimal::from(4));
}

#[test]
fn unauthorized_actor_is_refused_before_any_effect() {
    let store = Arc::new(InMemoryStockStore::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let policy = Arc::new(PolicyAuthorizer::new());
    let numbering = Arc::new(InMemoryNumbering::new());

    let clerk = ActorId::new();
    policy.grant(clerk, Permission::COUNT_CREATE);

    let ledger = LedgerStore::new(store.clone(), audit.clone());
    let counts = StockCountService::new(store.clone(), policy.clone(), audit.clone(), numbering);
    let reservations = ReservationManager::new(store, policy, audit.clone());

    let (location, item) = (LocationId::new(), ItemId::new());
    ledger
        .apply_movement(&receipt(location, item, 10, 1, clerk))
        .unwrap();

    let count = counts.create_count(location, &[], clerk).unwrap();
    assert!(matches!(
        counts.post_count(count.count_id(), clerk),
        Err(DomainError::Unauthorized(_))
    ));
    assert!(matches!(
        reservations.reserve(&ReserveRequest {
            location,
            item,
            quantity: Decimal::ONE,
            document: DocumentRef::new("sales_order", Uuid::now_v7(), "SO-2025-1005"),
            expires_at: None,
            actor: clerk,
        }),
        Err(DomainError::Unauthorized(_))
    ));

    // The refused operations left no audit trace and no state change.
    let actions: Vec<_> = audit.events().into_iter().map(|e| e.action).collect();
    assert!(!actions.iter().any(|a| a.starts_with("post")));
    assert!(!audit.events().iter().any(|e| e.entity_type == "reservation"));
    assert_eq!(
        counts.count(count.count_id()).unwrap().unwrap().status(),
        CountStatus::Draft
    );
}

#[test]
fn audit_trail_records_count_lifecycle() {
    let h = harness();
    let (location, item) = (LocationId::new(), ItemId::new());
    h.ledger
        .apply_movement(&receipt(location, item, 50, 10, h.actor))
        .unwrap();

    let count = h
        .counts
        .create_count(
            location,
            &[CountLineSeed {
                item,
                uom: UnitOfMeasure::each(),
            }],
            h.actor,
        )
        .unwrap();
    h.counts
        .update_count(
            count.count_id(),
            &[CountLineUpdate {
                item,
                counted_qty: Decimal::from(45),
            }],
            h.actor,
        )
        .unwrap();
    h.counts.post_count(count.count_id(), h.actor).unwrap();
    h.counts
        .revoke_count(count.count_id(), "recount ordered", h.actor)
        .unwrap();

    let count_actions: Vec<_> = h
        .audit
        .events()
        .into_iter()
        .filter(|e| e.entity_type == "stock_count")
        .map(|e| e.action)
        .collect();
    assert_eq!(count_actions, ["create", "update", "post", "revoke"]);

    let revoke = h
        .audit
        .events()
        .into_iter()
        .find(|e| e.action == "revoke")
        .unwrap();
    assert_eq!(revoke.reason.as_deref(), Some("recount ordered"));

    // Movement audit snapshots identify the entry without a journal join.
    let movement = h
        .audit
        .events()
        .into_iter()
        .find(|e| e.entity_type == "stock_movement")
        .unwrap();
    let after = movement.after.unwrap();
    assert_eq!(after["location"], serde_json::json!(location));
    assert_eq!(after["item"], serde_json::json!(item));
    assert_eq!(after["balance_after"], serde_json::json!(Decimal::from(50)));
}
