//! Audit trail collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

use stockbook_core::ActorId;

/// One audit trail entry. `before`/`after` carry serialized entity state for
/// mutations; `reason` records why a rejected operation failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub actor: ActorId,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: Uuid,
        action: impl Into<String>,
        actor: ActorId,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            action: action.into(),
            actor,
            before: None,
            after: None,
            reason: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Audit sink consumed by the services.
///
/// Recording is best-effort by contract: a failing sink must not veto the
/// business operation, so the method is infallible and implementations keep
/// their own error handling internal.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Audit log that retains events in memory, for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Audit log that forwards events to the tracing subscriber instead of
/// retaining them. Useful when the embedding application keeps its own audit
/// storage and only wants operational visibility here.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            action = %event.action,
            actor = %event.actor,
            reason = event.reason.as_deref(),
            "audit"
        );
    }
}
