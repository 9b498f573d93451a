//! Postgres-backed stock store implementation.
//!
//! Rows carry the queryable columns plus the serialized domain object as
//! JSONB (`payload`), so the database never re-implements domain rules: every
//! mutation loads the payload, applies the domain transformation and writes
//! the result back inside one transaction.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE ledger_entries (
//!     location_id UUID        NOT NULL,
//!     item_id     UUID        NOT NULL,
//!     payload     JSONB       NOT NULL,
//!     updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     PRIMARY KEY (location_id, item_id)
//! );
//!
//! CREATE TABLE stock_movements (
//!     movement_id UUID        PRIMARY KEY,
//!     seq         BIGSERIAL   NOT NULL UNIQUE,
//!     location_id UUID        NOT NULL,
//!     item_id     UUID        NOT NULL,
//!     doc_type    TEXT        NOT NULL,
//!     doc_id      UUID        NOT NULL,
//!     occurred_at TIMESTAMPTZ NOT NULL,
//!     payload     JSONB       NOT NULL
//! );
//! CREATE INDEX idx_movements_entry ON stock_movements (location_id, item_id, seq);
//! CREATE INDEX idx_movements_document ON stock_movements (doc_type, doc_id, seq);
//!
//! CREATE TABLE reservations (
//!     reservation_id UUID        PRIMARY KEY,
//!     location_id    UUID        NOT NULL,
//!     item_id        UUID        NOT NULL,
//!     status         TEXT        NOT NULL,
//!     expires_at     TIMESTAMPTZ,
//!     payload        JSONB       NOT NULL
//! );
//! CREATE INDEX idx_reservations_entry ON reservations (location_id, item_id, status);
//!
//! CREATE TABLE stock_counts (
//!     count_id UUID   PRIMARY KEY,
//!     status   TEXT   NOT NULL,
//!     version  BIGINT NOT NULL,
//!     payload  JSONB  NOT NULL
//! );
//! ```
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `DomainError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | DomainError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (unique violation) | `23505` | `StateConflict` | Duplicate id insert / concurrent writer |
//! | Database (other) | Any other | `Persistence` | Other database errors |
//! | PoolClosed / RowNotFound / Other | N/A | `Persistence` | Pool closed, network failure, etc. |
//!
//! ## Concurrency
//!
//! Mutations lock the affected `ledger_entries` and `stock_counts` rows with
//! `SELECT ... FOR UPDATE`, so two concurrent issues against the same entry
//! serialize at the database and the loser observes the winner's balance.
//! Count headers additionally carry the domain `version`; a stale write fails
//! the version check even if the row lock has long been released.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockbook_core::{DomainError, DomainResult, ReservationId, StockCountId};
use stockbook_counts::StockCount;
use stockbook_ledger::{EntryKey, LedgerEntry, MovementRecord, MovementRequest};
use stockbook_reservations::{Reservation, ReservationOutcome};

use super::r#trait::{stage_movement, AppliedMovement, StockStore};

/// Postgres-backed stock store.
///
/// The `StockStore` trait is synchronous; the blocking impl below bridges to
/// the inherent async methods via the ambient tokio runtime, mirroring how
/// the async pool is consumed from synchronous orchestration code.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(location = %key.location, item = %key.item), err)]
    pub async fn fetch_entry(&self, key: &EntryKey) -> DomainResult<Option<LedgerEntry>> {
        let row = sqlx::query(
            "SELECT payload FROM ledger_entries WHERE location_id = $1 AND item_id = $2",
        )
        .bind(key.location.as_uuid())
        .bind(key.item.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_entry", e))?;

        row.map(|row| decode_payload::<LedgerEntry>("ledger_entries", &row))
            .transpose()
    }

    pub async fn fetch_entries(&self) -> DomainResult<Vec<LedgerEntry>> {
        let rows = sqlx::query("SELECT payload FROM ledger_entries ORDER BY location_id, item_id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_entries", e))?;

        rows.iter()
            .map(|row| decode_payload("ledger_entries", row))
            .collect()
    }

    /// Apply a batch of movements in one transaction.
    ///
    /// Each affected entry row is locked with `FOR UPDATE` before the domain
    /// transformation runs, so concurrent batches against the same entry
    /// serialize and the all-or-nothing guarantee holds across the batch.
    #[instrument(skip(self, requests), fields(batch_len = requests.len()), err)]
    pub async fn apply_movement_batch(
        &self,
        requests: &[MovementRequest],
    ) -> DomainResult<Vec<AppliedMovement>> {
        if requests.is_empty() {
            return Ok(vec![]);
        }

        let mut tx = begin(&self.pool).await?;
        let applied = apply_in_tx(&mut tx, requests, Utc::now()).await?;
        commit(tx).await?;
        Ok(applied)
    }

    pub async fn update_reorder_levels(
        &self,
        key: &EntryKey,
        reorder_point: Option<Decimal>,
        reorder_quantity: Option<Decimal>,
    ) -> DomainResult<LedgerEntry> {
        let mut tx = begin(&self.pool).await?;
        let now = Utc::now();
        let entry = lock_entry(&mut tx, key)
            .await?
            .unwrap_or_else(|| LedgerEntry::new(*key, now));
        let next = entry.with_reorder_levels(reorder_point, reorder_quantity, now);
        upsert_entry(&mut tx, &next).await?;
        commit(tx).await?;
        Ok(next)
    }

    pub async fn fetch_movements_for_entry(
        &self,
        key: &EntryKey,
    ) -> DomainResult<Vec<MovementRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM stock_movements
            WHERE location_id = $1 AND item_id = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(key.location.as_uuid())
        .bind(key.item.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_movements_for_entry", e))?;

        rows.iter()
            .map(|row| decode_payload("stock_movements", row))
            .collect()
    }

    pub async fn fetch_movements_for_document(
        &self,
        doc_type: &str,
        doc_id: Uuid,
    ) -> DomainResult<Vec<MovementRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM stock_movements
            WHERE doc_type = $1 AND doc_id = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(doc_type)
        .bind(doc_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_movements_for_document", e))?;

        rows.iter()
            .map(|row| decode_payload("stock_movements", row))
            .collect()
    }

    #[instrument(skip(self, reservation), fields(reservation_id = %reservation.reservation_id()), err)]
    pub async fn insert_reservation(&self, reservation: &Reservation) -> DomainResult<Reservation> {
        let mut tx = begin(&self.pool).await?;
        let key = EntryKey::new(reservation.location(), reservation.item());
        let entry = lock_entry(&mut tx, &key).await?.ok_or_else(|| {
            DomainError::not_found(format!(
                "no ledger entry for item {} at location {}",
                key.item, key.location
            ))
        })?;

        let held = entry.with_hold(reservation.quantity(), Utc::now())?;
        upsert_entry(&mut tx, &held).await?;

        sqlx::query(
            r#"
            INSERT INTO reservations (reservation_id, location_id, item_id, status, expires_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation.reservation_id().as_uuid())
        .bind(key.location.as_uuid())
        .bind(key.item.as_uuid())
        .bind(reservation.status().as_str())
        .bind(reservation.expires_at())
        .bind(encode_payload(reservation)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::state_conflict(format!(
                    "reservation {} already exists",
                    reservation.reservation_id()
                ))
            } else {
                map_sqlx_error("insert_reservation", e)
            }
        })?;

        commit(tx).await?;
        Ok(reservation.clone())
    }

    #[instrument(skip(self), fields(reservation_id = %id, outcome = outcome.as_str()), err)]
    pub async fn settle_reservation_by_id(
        &self,
        id: ReservationId,
        outcome: ReservationOutcome,
    ) -> DomainResult<Reservation> {
        let mut tx = begin(&self.pool).await?;
        let now = Utc::now();

        let row = sqlx::query("SELECT payload FROM reservations WHERE reservation_id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("settle_reservation", e))?
            .ok_or_else(|| DomainError::not_found(format!("reservation {id}")))?;
        let reservation: Reservation = decode_payload("reservations", &row)?;

        let settled = reservation.settled(outcome, now)?;

        if outcome.returns_hold() {
            let key = EntryKey::new(reservation.location(), reservation.item());
            let entry = lock_entry(&mut tx, &key).await?.ok_or_else(|| {
                DomainError::persistence(format!(
                    "reservation {id} references a missing ledger entry"
                ))
            })?;
            let released = entry.with_hold_released(reservation.unfulfilled_quantity(), now)?;
            upsert_entry(&mut tx, &released).await?;
        }

        sqlx::query("UPDATE reservations SET status = $2, payload = $3 WHERE reservation_id = $1")
            .bind(id.as_uuid())
            .bind(settled.status().as_str())
            .bind(encode_payload(&settled)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("settle_reservation", e))?;

        commit(tx).await?;
        Ok(settled)
    }

    pub async fn fetch_reservation(&self, id: ReservationId) -> DomainResult<Option<Reservation>> {
        let row = sqlx::query("SELECT payload FROM reservations WHERE reservation_id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_reservation", e))?;

        row.map(|row| decode_payload("reservations", &row)).transpose()
    }

    pub async fn fetch_active_reservations(
        &self,
        key: &EntryKey,
    ) -> DomainResult<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM reservations
            WHERE location_id = $1 AND item_id = $2 AND status = 'active'
            "#,
        )
        .bind(key.location.as_uuid())
        .bind(key.item.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_active_reservations", e))?;

        rows.iter()
            .map(|row| decode_payload("reservations", row))
            .collect()
    }

    pub async fn fetch_reservations_due(
        &self,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<Reservation>> {
        let rows = sqlx::query(
            "SELECT payload FROM reservations WHERE status = 'active' AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_reservations_due", e))?;

        rows.iter()
            .map(|row| decode_payload("reservations", row))
            .collect()
    }

    pub async fn insert_count_header(&self, count: &StockCount) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO stock_counts (count_id, status, version, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(count.count_id().as_uuid())
        .bind(count.status().as_str())
        .bind(count.version() as i64)
        .bind(encode_payload(count)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::state_conflict(format!("count {} already exists", count.number()))
            } else {
                map_sqlx_error("insert_count_header", e)
            }
        })?;
        Ok(())
    }

    pub async fn update_count_header(&self, count: &StockCount) -> DomainResult<()> {
        let mut tx = begin(&self.pool).await?;
        check_count_version(&mut tx, count).await?;
        write_count_header(&mut tx, count).await?;
        commit(tx).await
    }

    /// Apply the movements and replace the header in one transaction.
    #[instrument(
        skip(self, count, movements),
        fields(count = count.number(), movement_count = movements.len()),
        err
    )]
    pub async fn commit_count_tx(
        &self,
        count: &StockCount,
        movements: &[MovementRequest],
    ) -> DomainResult<Vec<AppliedMovement>> {
        let mut tx = begin(&self.pool).await?;
        check_count_version(&mut tx, count).await?;
        let applied = apply_in_tx(&mut tx, movements, Utc::now()).await?;
        write_count_header(&mut tx, count).await?;
        commit(tx).await?;
        Ok(applied)
    }

    pub async fn delete_count_header(&self, id: StockCountId) -> DomainResult<StockCount> {
        let mut tx = begin(&self.pool).await?;
        let row = sqlx::query("SELECT payload FROM stock_counts WHERE count_id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_count_header", e))?
            .ok_or_else(|| DomainError::not_found(format!("stock count {id}")))?;
        let stored: StockCount = decode_payload("stock_counts", &row)?;
        stored.ensure_deletable()?;

        sqlx::query("DELETE FROM stock_counts WHERE count_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_count_header", e))?;

        commit(tx).await?;
        Ok(stored)
    }

    pub async fn fetch_count(&self, id: StockCountId) -> DomainResult<Option<StockCount>> {
        let row = sqlx::query("SELECT payload FROM stock_counts WHERE count_id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_count", e))?;

        row.map(|row| decode_payload("stock_counts", &row)).transpose()
    }
}

async fn begin(pool: &PgPool) -> DomainResult<Transaction<'static, Postgres>> {
    pool.begin()
        .await
        .map_err(|e| map_sqlx_error("begin_transaction", e))
}

async fn commit(tx: Transaction<'static, Postgres>) -> DomainResult<()> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

/// Lock one entry row and rehydrate it, or `None` if it does not exist yet.
async fn lock_entry(
    tx: &mut Transaction<'static, Postgres>,
    key: &EntryKey,
) -> DomainResult<Option<LedgerEntry>> {
    let row = sqlx::query(
        "SELECT payload FROM ledger_entries WHERE location_id = $1 AND item_id = $2 FOR UPDATE",
    )
    .bind(key.location.as_uuid())
    .bind(key.item.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_entry", e))?;

    row.map(|row| decode_payload("ledger_entries", &row)).transpose()
}

async fn upsert_entry(
    tx: &mut Transaction<'static, Postgres>,
    entry: &LedgerEntry,
) -> DomainResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (location_id, item_id, payload, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (location_id, item_id)
        DO UPDATE SET payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(entry.location().as_uuid())
    .bind(entry.item().as_uuid())
    .bind(encode_payload(entry)?)
    .bind(entry.updated_at())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_entry", e))?;
    Ok(())
}

/// Apply a movement batch against locked rows inside `tx`.
async fn apply_in_tx(
    tx: &mut Transaction<'static, Postgres>,
    requests: &[MovementRequest],
    now: DateTime<Utc>,
) -> DomainResult<Vec<AppliedMovement>> {
    let mut applied = Vec::with_capacity(requests.len());

    for request in requests {
        let key = EntryKey::new(request.location, request.item);
        let current = lock_entry(tx, &key)
            .await?
            .unwrap_or_else(|| LedgerEntry::new(key, now));

        let movement = stage_movement(&current, request, now)?;

        upsert_entry(tx, &movement.entry).await?;
        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (movement_id, location_id, item_id, doc_type, doc_id, occurred_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(movement.record.id.as_uuid())
        .bind(key.location.as_uuid())
        .bind(key.item.as_uuid())
        .bind(&movement.record.document.doc_type)
        .bind(movement.record.document.doc_id)
        .bind(movement.record.occurred_at)
        .bind(encode_payload(&movement.record)?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        applied.push(movement);
    }

    Ok(applied)
}

async fn check_count_version(
    tx: &mut Transaction<'static, Postgres>,
    incoming: &StockCount,
) -> DomainResult<()> {
    let row = sqlx::query("SELECT version FROM stock_counts WHERE count_id = $1 FOR UPDATE")
        .bind(incoming.count_id().as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_count_version", e))?
        .ok_or_else(|| {
            DomainError::not_found(format!("stock count {}", incoming.count_id()))
        })?;

    let stored_version: i64 = row
        .try_get("version")
        .map_err(|e| DomainError::persistence(format!("failed to read count version: {e}")))?;

    if incoming.version() != stored_version as u64 + 1 {
        return Err(DomainError::state_conflict(format!(
            "count {} was modified concurrently (stored version {}, incoming {})",
            incoming.number(),
            stored_version,
            incoming.version()
        )));
    }
    Ok(())
}

async fn write_count_header(
    tx: &mut Transaction<'static, Postgres>,
    count: &StockCount,
) -> DomainResult<()> {
    sqlx::query("UPDATE stock_counts SET status = $2, version = $3, payload = $4 WHERE count_id = $1")
        .bind(count.count_id().as_uuid())
        .bind(count.status().as_str())
        .bind(count.version() as i64)
        .bind(encode_payload(count)?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write_count_header", e))?;
    Ok(())
}

fn encode_payload<T: serde::Serialize>(value: &T) -> DomainResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| DomainError::persistence(format!("failed to serialize payload: {e}")))
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    table: &str,
    row: &sqlx::postgres::PgRow,
) -> DomainResult<T> {
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| DomainError::persistence(format!("failed to read {table} payload: {e}")))?;
    serde_json::from_value(payload)
        .map_err(|e| DomainError::persistence(format!("failed to deserialize {table} row: {e}")))
}

/// Map SQLx errors to DomainError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                DomainError::state_conflict(msg)
            } else {
                DomainError::persistence(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            DomainError::persistence(format!("connection pool closed in {operation}"))
        }
        _ => DomainError::persistence(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

impl StockStore for PostgresStockStore {
    // The StockStore trait is synchronous; bridge to the async methods via
    // the ambient tokio runtime, same as callers of the async pool elsewhere.

    fn entry(&self, key: &EntryKey) -> DomainResult<Option<LedgerEntry>> {
        block_on(self.fetch_entry(key))
    }

    fn entries(&self) -> DomainResult<Vec<LedgerEntry>> {
        block_on(self.fetch_entries())
    }

    fn apply_movements(&self, requests: &[MovementRequest]) -> DomainResult<Vec<AppliedMovement>> {
        block_on(self.apply_movement_batch(requests))
    }

    fn set_reorder_levels(
        &self,
        key: &EntryKey,
        reorder_point: Option<Decimal>,
        reorder_quantity: Option<Decimal>,
    ) -> DomainResult<LedgerEntry> {
        block_on(self.update_reorder_levels(key, reorder_point, reorder_quantity))
    }

    fn movements_for_entry(&self, key: &EntryKey) -> DomainResult<Vec<MovementRecord>> {
        block_on(self.fetch_movements_for_entry(key))
    }

    fn movements_for_document(
        &self,
        doc_type: &str,
        doc_id: Uuid,
    ) -> DomainResult<Vec<MovementRecord>> {
        block_on(self.fetch_movements_for_document(doc_type, doc_id))
    }

    fn create_reservation(&self, reservation: &Reservation) -> DomainResult<Reservation> {
        block_on(self.insert_reservation(reservation))
    }

    fn settle_reservation(
        &self,
        id: ReservationId,
        outcome: ReservationOutcome,
    ) -> DomainResult<Reservation> {
        block_on(self.settle_reservation_by_id(id, outcome))
    }

    fn reservation(&self, id: ReservationId) -> DomainResult<Option<Reservation>> {
        block_on(self.fetch_reservation(id))
    }

    fn active_reservations(&self, key: &EntryKey) -> DomainResult<Vec<Reservation>> {
        block_on(self.fetch_active_reservations(key))
    }

    fn reservations_due(&self, now: DateTime<Utc>) -> DomainResult<Vec<Reservation>> {
        block_on(self.fetch_reservations_due(now))
    }

    fn insert_count(&self, count: &StockCount) -> DomainResult<()> {
        block_on(self.insert_count_header(count))
    }

    fn update_count(&self, count: &StockCount) -> DomainResult<()> {
        block_on(self.update_count_header(count))
    }

    fn commit_count(
        &self,
        count: &StockCount,
        movements: &[MovementRequest],
    ) -> DomainResult<Vec<AppliedMovement>> {
        block_on(self.commit_count_tx(count, movements))
    }

    fn delete_count(&self, id: StockCountId) -> DomainResult<StockCount> {
        block_on(self.delete_count_header(id))
    }

    fn count(&self, id: StockCountId) -> DomainResult<Option<StockCount>> {
        block_on(self.fetch_count(id))
    }
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output
where
    F::Output: UnwrapRuntime,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(fut),
        Err(_) => <F::Output as UnwrapRuntime>::missing_runtime(),
    }
}

/// Lets `block_on` produce a `DomainError` for any `DomainResult<T>` when no
/// tokio runtime is available, without boxing the future.
trait UnwrapRuntime {
    fn missing_runtime() -> Self;
}

impl<T> UnwrapRuntime for DomainResult<T> {
    fn missing_runtime() -> Self {
        Err(DomainError::persistence(
            "PostgresStockStore requires a tokio runtime context",
        ))
    }
}
