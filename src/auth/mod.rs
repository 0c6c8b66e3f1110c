//! Identity resolution, permission decisions and the authorization cascade
//!
//! Three layers, invoked in order for every request:
//! 1. [`identity`] turns request credentials into a stable user identity.
//! 2. [`permissions`] asks the portal's permission-decision service for
//!    ALLOW/DENY on a named permission.
//! 3. [`resolver`] combines both with an ownership lookup into the two-tier
//!    cascade every handler and every bulk item goes through.

pub mod identity;
pub mod permissions;
pub mod resolver;

pub use identity::{HeaderIdentityResolver, Identity, IdentityResolver};
pub use permissions::{
    Decision, HttpPermissionClient, PermissionClient, Scope, Verb, RESOURCE_API_KEY,
    RESOURCE_API_PRODUCT,
};
pub use resolver::{AuthorizationResolver, Tier};
