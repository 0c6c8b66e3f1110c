//! Caller identity resolution
//!
//! Converts inbound request credentials into a stable user identifier and a
//! set of group identifiers. Fails closed: a request with no verifiable
//! credentials is rejected before any permission check runs.

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::{Error, Result};

/// Default header carrying the caller's user identifier
pub const DEFAULT_USER_HEADER: &str = "x-portal-user-id";

/// Default header carrying the caller's comma-separated group identifiers
pub const DEFAULT_GROUPS_HEADER: &str = "x-portal-user-groups";

/// Resolved caller identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Stable opaque user identifier (e.g. "user:default/alice")
    pub user_id: String,
    /// Group identifiers the user belongs to
    pub groups: Vec<String>,
}

impl Identity {
    /// The short name of the user, the last segment of the identifier
    ///
    /// "user:default/alice" resolves to "alice"; an identifier without a
    /// separator is returned whole.
    pub fn short_name(&self) -> &str {
        self.user_id.rsplit('/').next().unwrap_or(&self.user_id)
    }
}

/// Trait resolving request credentials into an [`Identity`]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve the caller identity, failing closed when credentials are absent
    async fn resolve(&self, headers: &HeaderMap) -> Result<Identity>;
}

/// Identity resolver trusting headers set by the portal front-proxy
///
/// The portal terminates user authentication and forwards the verified
/// identity in trusted headers, the same model an aggregated API server uses
/// for `X-Remote-User`. This backend must only be reachable through that
/// proxy.
pub struct HeaderIdentityResolver {
    user_header: String,
    groups_header: String,
}

impl HeaderIdentityResolver {
    /// Create a resolver reading the given header names
    pub fn new(user_header: impl Into<String>, groups_header: impl Into<String>) -> Self {
        Self {
            user_header: user_header.into(),
            groups_header: groups_header.into(),
        }
    }
}

impl Default for HeaderIdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_USER_HEADER, DEFAULT_GROUPS_HEADER)
    }
}

#[async_trait]
impl IdentityResolver for HeaderIdentityResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Identity> {
        let user_id = headers
            .get(&self.user_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::authentication("authentication required: no verifiable credentials")
            })?
            .to_string();

        let groups = headers
            .get(&self.groups_header)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Identity { user_id, groups })
    }
}
