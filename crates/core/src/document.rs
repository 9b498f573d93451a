//! Source-document linkage carried by movements, reservations and counts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_object::ValueObject;

/// Reference to the business document that caused a mutation.
///
/// The engine does not author documents; it only records which document a
/// movement or reservation belongs to, so the journal can be queried by
/// document and postings can be reversed as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Document family, e.g. `"purchase_receipt"`, `"stock_count"`.
    pub doc_type: String,
    /// Identifier of the document in its own module.
    pub doc_id: Uuid,
    /// Human-readable document number, e.g. `"CNT-2025-1007"`.
    pub doc_number: String,
}

impl DocumentRef {
    pub fn new(doc_type: impl Into<String>, doc_id: Uuid, doc_number: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            doc_id,
            doc_number: doc_number.into(),
        }
    }
}

impl ValueObject for DocumentRef {}

impl core::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {} ({})", self.doc_type, self.doc_number, self.doc_id)
    }
}
