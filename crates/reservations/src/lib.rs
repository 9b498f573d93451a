//! Reservations domain module.
//!
//! Soft claims against **available** (not on-hand) quantity for pending
//! outbound documents. Pure domain logic; the hold bookkeeping on the ledger
//! entry itself lives with the transaction boundary.

pub mod reservation;

pub use reservation::{Reservation, ReservationOutcome, ReservationStatus};
