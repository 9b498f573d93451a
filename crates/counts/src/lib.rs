//! Stock count reconciliation domain module.
//!
//! A stock count snapshots ledger quantities, records physical counts,
//! derives variances and turns them into adjustment movements. The state
//! machine is `draft → in_progress → completed (posted) → cancelled`, with
//! deletion permitted only while draft and revocation only after posting.
//! Pure domain logic; posting/reversal is committed by the transaction
//! boundary through the canonical movement path.

pub mod count;

pub use count::{CountLineSeed, CountLineUpdate, CountStatus, StockCount, StockCountLine};
