//! Resolved principals.

use serde::{Deserialize, Serialize};

use stockbook_core::ActorId;

use crate::permissions::Permission;

/// A fully resolved principal for authorization decisions.
///
/// Construction is intentionally decoupled from storage and transport: the
/// surrounding application derives the permission set from its own session
/// and role machinery before calling into the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub actor_id: ActorId,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(actor_id: ActorId, permissions: Vec<Permission>) -> Self {
        Self {
            actor_id,
            permissions,
        }
    }

    /// Principal holding only the wildcard permission.
    pub fn with_all_permissions(actor_id: ActorId) -> Self {
        Self::new(actor_id, vec![Permission::new("*")])
    }
}
