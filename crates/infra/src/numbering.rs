//! Document number sequences.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Datelike, Utc};

use stockbook_core::DomainResult;

/// Allocator of human-readable document numbers.
///
/// Numbers are unique per scope (e.g. all stock counts share one sequence)
/// and must never be reused, even for documents that are later deleted.
pub trait DocumentNumbering: Send + Sync {
    /// Next number for `scope`, formatted with `prefix`
    /// (e.g. `CNT-2026-1001`).
    fn next_number(&self, scope: &str, prefix: &str) -> DomainResult<String>;
}

/// Process-local sequence allocator. Sequences start at 1001 per scope and
/// do not survive restarts; production embedders back this trait with their
/// database sequence instead.
#[derive(Debug, Default)]
pub struct InMemoryNumbering {
    sequences: Mutex<HashMap<String, u64>>,
}

impl InMemoryNumbering {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentNumbering for InMemoryNumbering {
    fn next_number(&self, scope: &str, prefix: &str) -> DomainResult<String> {
        let mut sequences = self.sequences.lock().unwrap_or_else(|e| e.into_inner());
        let seq = sequences.entry(scope.to_string()).or_insert(1000);
        *seq += 1;
        Ok(format!("{}-{}-{}", prefix, Utc::now().year(), seq))
    }
}
