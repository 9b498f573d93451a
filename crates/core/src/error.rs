//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock shortfalls, lifecycle conflicts). Infrastructure failures surface as
/// `Persistence` only after the store has guaranteed no partial write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A movement or reservation would drive a quantity negative.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// An operation was attempted in the wrong lifecycle state
    /// (double-post, revoke-without-post, release of a settled reservation).
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Authorization failure at the service boundary.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Transactional failure; the caller sees no partial effect.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_stock(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn state_conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// True for failures the caller can fix by changing the request
    /// (as opposed to retrying against the store).
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }
}
