//! Authorization checks.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use thiserror::Error;

use stockbook_core::ActorId;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Permission-check contract consumed by the services.
///
/// Every mutating reservation and count operation asks this collaborator
/// before proceeding; a `false` answer surfaces as an authorization failure
/// to the caller.
pub trait Authorizer: Send + Sync {
    fn check_permission(&self, actor: &ActorId, permission: &Permission) -> bool;
}

/// In-memory actor → permission-set policy.
///
/// Intended for tests/dev and for embedders without their own policy engine.
#[derive(Debug, Default)]
pub struct PolicyAuthorizer {
    grants: RwLock<HashMap<ActorId, Principal>>,
}

impl PolicyAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, actor: ActorId, permission: Permission) {
        let mut grants = self.grants.write().unwrap_or_else(|e| e.into_inner());
        grants
            .entry(actor)
            .or_insert_with(|| Principal::new(actor, Vec::new()))
            .permissions
            .push(permission);
    }

    pub fn grant_all(&self, actor: ActorId) {
        self.grant(actor, Permission::new("*"));
    }
}

impl Authorizer for PolicyAuthorizer {
    fn check_permission(&self, actor: &ActorId, permission: &Permission) -> bool {
        let grants = self.grants.read().unwrap_or_else(|e| e.into_inner());
        match grants.get(actor) {
            Some(principal) => authorize(principal, permission).is_ok(),
            None => false,
        }
    }
}

/// Authorizer that grants everything; for tests and benchmarks.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn check_permission(&self, _actor: &ActorId, _permission: &Permission) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_grants_everything() {
        let principal = Principal::with_all_permissions(ActorId::new());
        assert!(authorize(&principal, &Permission::COUNT_POST).is_ok());
    }

    #[test]
    fn explicit_permission_is_required_otherwise() {
        let actor = ActorId::new();
        let principal = Principal::new(actor, vec![Permission::RESERVE]);
        assert!(authorize(&principal, &Permission::RESERVE).is_ok());

        let err = authorize(&principal, &Permission::COUNT_DELETE).unwrap_err();
        assert_eq!(
            err,
            AuthzError::Forbidden("counts.delete".to_string())
        );
    }

    #[test]
    fn policy_authorizer_tracks_grants_per_actor() {
        let policy = PolicyAuthorizer::new();
        let clerk = ActorId::new();
        let stranger = ActorId::new();
        policy.grant(clerk, Permission::COUNT_UPDATE);

        assert!(policy.check_permission(&clerk, &Permission::COUNT_UPDATE));
        assert!(!policy.check_permission(&clerk, &Permission::COUNT_POST));
        assert!(!policy.check_permission(&stranger, &Permission::COUNT_UPDATE));
    }
}
