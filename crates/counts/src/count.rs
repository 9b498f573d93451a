//! Stock count header, lines and state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{
    ActorId, DocumentRef, DomainError, DomainResult, Entity, ItemId, LocationId, StockCountId,
    UnitOfMeasure,
};
use stockbook_ledger::{MovementKind, MovementRecord, MovementRequest};

/// Header lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    Draft,
    InProgress,
    Completed,
    Cancelled,
}

impl CountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Seed for one count line: the item to count and the unit it is counted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLineSeed {
    pub item: ItemId,
    pub uom: UnitOfMeasure,
}

/// One recorded physical count for a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLineUpdate {
    pub item: ItemId,
    pub counted_qty: Decimal,
}

/// One line of a stock count.
///
/// `system_qty` is snapshotted when the line is created and never refreshed;
/// the variance is always relative to that snapshot. `counted_qty` stays
/// `None` until a physical count is recorded — an uncounted line is *not* a
/// count of zero and contributes no variance when the header is posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCountLine {
    pub item: ItemId,
    pub uom: UnitOfMeasure,
    pub system_qty: Decimal,
    pub counted_qty: Option<Decimal>,
}

impl StockCountLine {
    pub fn seeded(item: ItemId, uom: UnitOfMeasure, system_qty: Decimal) -> Self {
        Self {
            item,
            uom,
            system_qty,
            counted_qty: None,
        }
    }

    /// `counted - system`, present only once the line has been counted.
    pub fn variance_qty(&self) -> Option<Decimal> {
        self.counted_qty.map(|counted| counted - self.system_qty)
    }

    pub fn has_variance(&self) -> bool {
        self.variance_qty()
            .is_some_and(|variance| variance != Decimal::ZERO)
    }
}

/// Stock count header; owns its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCount {
    id: StockCountId,
    location: LocationId,
    number: String,
    count_date: DateTime<Utc>,
    status: CountStatus,
    is_posted: bool,
    lines: Vec<StockCountLine>,
    created_by: ActorId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    posted_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    /// Bumped on every transformation; the store uses it to detect
    /// concurrent modification of the same header.
    version: u64,
}

impl Entity for StockCount {
    type Id = StockCountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl StockCount {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: StockCountId,
        location: LocationId,
        number: impl Into<String>,
        count_date: DateTime<Utc>,
        lines: Vec<StockCountLine>,
        created_by: ActorId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            location,
            number: number.into(),
            count_date,
            status: CountStatus::Draft,
            is_posted: false,
            lines,
            created_by,
            created_at: at,
            updated_at: at,
            posted_at: None,
            cancelled_at: None,
            version: 1,
        }
    }

    pub fn count_id(&self) -> StockCountId {
        self.id
    }

    pub fn location(&self) -> LocationId {
        self.location
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn count_date(&self) -> DateTime<Utc> {
        self.count_date
    }

    pub fn status(&self) -> CountStatus {
        self.status
    }

    pub fn is_posted(&self) -> bool {
        self.is_posted
    }

    pub fn lines(&self) -> &[StockCountLine] {
        &self.lines
    }

    pub fn created_by(&self) -> ActorId {
        self.created_by
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.posted_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Document reference stamped on adjustment movements at posting.
    pub fn document_ref(&self) -> DocumentRef {
        DocumentRef::new("stock_count", self.id.into(), self.number.clone())
    }

    /// Derived reference for reversal movements (`<number>-REV`), so querying
    /// the journal by the original count never returns the reversal rows.
    pub fn revocation_document_ref(&self) -> DocumentRef {
        DocumentRef::new(
            "stock_count_revocation",
            self.id.into(),
            format!("{}-REV", self.number),
        )
    }

    /// Number of lines that would produce an adjustment if posted now.
    pub fn variance_line_count(&self) -> usize {
        self.lines.iter().filter(|line| line.has_variance()).count()
    }

    fn ensure_editable(&self) -> DomainResult<()> {
        if self.is_posted {
            return Err(DomainError::state_conflict(format!(
                "count {} is already posted",
                self.number
            )));
        }
        match self.status {
            CountStatus::Draft | CountStatus::InProgress => Ok(()),
            status => Err(DomainError::state_conflict(format!(
                "count {} is {} and cannot be edited",
                self.number,
                status.as_str()
            ))),
        }
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status != CountStatus::Draft {
            return Err(DomainError::state_conflict(format!(
                "count {} is {}; only draft counts can be deleted",
                self.number,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Record physical counts, moving the header to `in_progress`.
    pub fn with_counted(
        &self,
        updates: &[CountLineUpdate],
        at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        self.ensure_editable()?;

        let mut lines = self.lines.clone();
        for update in updates {
            if update.counted_qty < Decimal::ZERO {
                return Err(DomainError::validation(
                    "counted quantity cannot be negative",
                ));
            }
            let line = lines
                .iter_mut()
                .find(|line| line.item == update.item)
                .ok_or_else(|| {
                    DomainError::not_found(format!(
                        "count {} has no line for item {}",
                        self.number, update.item
                    ))
                })?;
            line.counted_qty = Some(update.counted_qty);
        }

        Ok(Self {
            status: CountStatus::InProgress,
            lines,
            updated_at: at,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Adjustment movements for every counted line with nonzero variance.
    ///
    /// Positive variance classifies as `adjustment_in`, negative as
    /// `adjustment_out`; the request quantity is the variance magnitude and
    /// the source document is this count.
    pub fn adjustment_requests(&self, actor: ActorId) -> Vec<MovementRequest> {
        let document = self.document_ref();
        self.lines
            .iter()
            .filter_map(|line| {
                let variance = line.variance_qty()?;
                if variance == Decimal::ZERO {
                    return None;
                }
                let kind = if variance > Decimal::ZERO {
                    MovementKind::AdjustmentIn
                } else {
                    MovementKind::AdjustmentOut
                };
                Some(MovementRequest {
                    location: self.location,
                    item: line.item,
                    kind,
                    quantity: variance.abs(),
                    uom: line.uom.clone(),
                    unit_cost: None,
                    document: document.clone(),
                    batch_id: None,
                    serial_id: None,
                    actor,
                    note: Some(format!("stock count {} variance", self.number)),
                })
            })
            .collect()
    }

    /// Inverse movements for a set of journal records posted by this count.
    pub fn reversal_requests(
        &self,
        posted: &[MovementRecord],
        actor: ActorId,
    ) -> Vec<MovementRequest> {
        let document = self.revocation_document_ref();
        posted
            .iter()
            .map(|record| MovementRequest {
                location: record.location,
                item: record.item,
                kind: record.kind.inverse(),
                quantity: record.quantity.abs(),
                uom: record.uom.clone(),
                unit_cost: None,
                document: document.clone(),
                batch_id: record.batch_id,
                serial_id: record.serial_id,
                actor,
                note: Some(format!("reversal of stock count {}", self.number)),
            })
            .collect()
    }

    /// Mark the header posted (`completed`, `is_posted`).
    pub fn posted(&self, at: DateTime<Utc>) -> DomainResult<Self> {
        self.ensure_editable()?;
        Ok(Self {
            status: CountStatus::Completed,
            is_posted: true,
            posted_at: Some(at),
            updated_at: at,
            version: self.version + 1,
            ..self.clone()
        })
    }

    /// Mark a posted header cancelled after its adjustments were reversed.
    pub fn revoked(&self, at: DateTime<Utc>) -> DomainResult<Self> {
        if !self.is_posted {
            return Err(DomainError::state_conflict(format!(
                "count {} has not been posted",
                self.number
            )));
        }
        if self.status == CountStatus::Cancelled {
            return Err(DomainError::state_conflict(format!(
                "count {} is already cancelled",
                self.number
            )));
        }
        Ok(Self {
            status: CountStatus::Cancelled,
            cancelled_at: Some(at),
            updated_at: at,
            version: self.version + 1,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_count(lines: Vec<StockCountLine>) -> StockCount {
        StockCount::new(
            StockCountId::new(),
            LocationId::new(),
            "CNT-2025-1001",
            Utc::now(),
            lines,
            ActorId::new(),
            Utc::now(),
        )
    }

    fn seeded_line(system_qty: i64) -> StockCountLine {
        StockCountLine::seeded(ItemId::new(), UnitOfMeasure::each(), Decimal::from(system_qty))
    }

    #[test]
    fn uncounted_line_has_no_variance() {
        let line = seeded_line(50);
        assert_eq!(line.variance_qty(), None);
        assert!(!line.has_variance());
    }

    #[test]
    fn recording_counts_moves_to_in_progress_and_derives_variance() {
        let line = seeded_line(50);
        let item = line.item;
        let count = test_count(vec![line]);

        let updated = count
            .with_counted(
                &[CountLineUpdate {
                    item,
                    counted_qty: Decimal::from(45),
                }],
                Utc::now(),
            )
            .unwrap();
        assert_eq!(updated.status(), CountStatus::InProgress);
        assert_eq!(
            updated.lines()[0].variance_qty(),
            Some(Decimal::from(-5))
        );
        assert_eq!(updated.version(), count.version() + 1);
    }

    #[test]
    fn update_for_unknown_item_is_not_found() {
        let count = test_count(vec![seeded_line(10)]);
        let err = count
            .with_counted(
                &[CountLineUpdate {
                    item: ItemId::new(),
                    counted_qty: Decimal::from(3),
                }],
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn adjustment_requests_skip_uncounted_and_zero_variance_lines() {
        let short = seeded_line(50);
        let short_item = short.item;
        let exact = seeded_line(20);
        let exact_item = exact.item;
        let over = seeded_line(5);
        let over_item = over.item;
        let uncounted = seeded_line(99);

        let count = test_count(vec![short, exact, over, uncounted]);
        let actor = ActorId::new();
        let count = count
            .with_counted(
                &[
                    CountLineUpdate {
                        item: short_item,
                        counted_qty: Decimal::from(45),
                    },
                    CountLineUpdate {
                        item: exact_item,
                        counted_qty: Decimal::from(20),
                    },
                    CountLineUpdate {
                        item: over_item,
                        counted_qty: Decimal::from(8),
                    },
                ],
                Utc::now(),
            )
            .unwrap();

        let requests = count.adjustment_requests(actor);
        assert_eq!(requests.len(), 2);
        assert_eq!(count.variance_line_count(), 2);

        let short_req = requests.iter().find(|r| r.item == short_item).unwrap();
        assert_eq!(short_req.kind, MovementKind::AdjustmentOut);
        assert_eq!(short_req.quantity, Decimal::from(5));
        assert_eq!(short_req.document.doc_type, "stock_count");

        let over_req = requests.iter().find(|r| r.item == over_item).unwrap();
        assert_eq!(over_req.kind, MovementKind::AdjustmentIn);
        assert_eq!(over_req.quantity, Decimal::from(3));
    }

    #[test]
    fn posting_is_one_way() {
        let count = test_count(vec![seeded_line(10)]);
        let posted = count.posted(Utc::now()).unwrap();
        assert_eq!(posted.status(), CountStatus::Completed);
        assert!(posted.is_posted());

        assert!(matches!(
            posted.posted(Utc::now()),
            Err(DomainError::StateConflict(_))
        ));
        assert!(matches!(
            posted.with_counted(&[], Utc::now()),
            Err(DomainError::StateConflict(_))
        ));
    }

    #[test]
    fn revoke_requires_posted_and_is_terminal() {
        let count = test_count(vec![seeded_line(10)]);
        assert!(matches!(
            count.revoked(Utc::now()),
            Err(DomainError::StateConflict(_))
        ));

        let posted = count.posted(Utc::now()).unwrap();
        let revoked = posted.revoked(Utc::now()).unwrap();
        assert_eq!(revoked.status(), CountStatus::Cancelled);
        assert!(matches!(
            revoked.revoked(Utc::now()),
            Err(DomainError::StateConflict(_))
        ));
    }

    #[test]
    fn delete_is_draft_only() {
        let count = test_count(vec![seeded_line(10)]);
        assert!(count.ensure_deletable().is_ok());

        let in_progress = count
            .with_counted(&[], Utc::now())
            .unwrap();
        assert!(in_progress.ensure_deletable().is_err());
    }

    #[test]
    fn revocation_document_carries_rev_suffix() {
        let count = test_count(vec![]);
        let doc = count.revocation_document_ref();
        assert_eq!(doc.doc_type, "stock_count_revocation");
        assert_eq!(doc.doc_number, format!("{}-REV", count.number()));
    }
}
