//! Unit of measure.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// Unit of measure recorded on movements and count lines.
///
/// Units are modeled as opaque strings (e.g. `"EA"`, `"KG"`); conversion
/// between units is out of scope for the ledger, which only records the unit
/// a quantity was stated in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitOfMeasure(Cow<'static, str>);

impl UnitOfMeasure {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    /// The default "each" unit.
    pub const fn each() -> Self {
        Self(Cow::Borrowed("EA"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UnitOfMeasure {
    fn default() -> Self {
        Self::each()
    }
}

impl ValueObject for UnitOfMeasure {}

impl core::fmt::Display for UnitOfMeasure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
