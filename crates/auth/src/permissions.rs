//! Permission identifiers.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "reservations.reserve").
/// A special wildcard permission `"*"` can be used by policy layers to
/// indicate "allow all" without hardcoding domain permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Create a reservation hold.
    pub const RESERVE: Permission = Permission(Cow::Borrowed("reservations.reserve"));
    /// Settle a reservation (fulfill, release or expire it).
    pub const RELEASE: Permission = Permission(Cow::Borrowed("reservations.release"));
    /// Create a stock count.
    pub const COUNT_CREATE: Permission = Permission(Cow::Borrowed("counts.create"));
    /// Record physical quantities on a count.
    pub const COUNT_UPDATE: Permission = Permission(Cow::Borrowed("counts.update"));
    /// Post a count's variances to the ledger.
    pub const COUNT_POST: Permission = Permission(Cow::Borrowed("counts.post"));
    /// Reverse a posted count.
    pub const COUNT_REVOKE: Permission = Permission(Cow::Borrowed("counts.revoke"));
    /// Hard-delete a draft count.
    pub const COUNT_DELETE: Permission = Permission(Cow::Borrowed("counts.delete"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
