//! Authorization collaborator.
//!
//! The engine does not own authentication or sessions; it only consumes a
//! permission-check contract before every mutating reservation or count
//! operation. Policy evaluation itself is a pure function over a resolved
//! principal.

pub mod authorize;
pub mod permissions;
pub mod principal;

pub use authorize::{authorize, AllowAll, Authorizer, AuthzError, PolicyAuthorizer};
pub use permissions::Permission;
pub use principal::Principal;
