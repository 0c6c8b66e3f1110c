//! Permission names and the permission-decision service client
//!
//! Permissions follow a paired naming scheme: `<resource>.<verb>.all` grants
//! the action unconditionally, `<resource>.<verb>.own` grants it only after
//! ownership verification. Creation permissions have no own/all split; the
//! key-creation permission instead takes a resource reference at check time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::Identity;
use crate::{Error, Result};

/// Resource segment for APIProduct permissions
pub const RESOURCE_API_PRODUCT: &str = "apiproduct";

/// Resource segment for APIKey permissions
pub const RESOURCE_API_KEY: &str = "apikey";

/// Permission to create APIProducts
pub const PERMISSION_API_PRODUCT_CREATE: &str = "apiproduct.create";

/// Permission to request an APIKey against a specific APIProduct
pub const PERMISSION_API_KEY_CREATE: &str = "apikey.create";

/// Verbs the own/all permission pairs cover
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    /// Read a resource or list a collection
    Read,
    /// Mutate a resource (including approve/reject on APIKeys)
    Update,
    /// Delete a resource
    Delete,
}

impl Verb {
    /// The verb segment used in permission names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Scope segment of a paired permission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Unconditional capability over every resource of the kind
    All,
    /// Capability restricted to resources the caller owns
    Own,
}

impl Scope {
    /// The scope segment used in permission names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Own => "own",
        }
    }
}

/// Build a scoped permission name, e.g. `apikey.update.all`
pub fn scoped_permission(resource: &str, verb: Verb, scope: Scope) -> String {
    format!("{resource}.{}.{}", verb.as_str(), scope.as_str())
}

/// Build a resource reference string, e.g. `apiproduct:teamA/weather`
pub fn resource_ref(kind: &str, namespace: &str, name: &str) -> String {
    format!("{kind}:{namespace}/{name}")
}

/// Outcome of a permission decision
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// The caller may perform the action
    Allow,
    /// The caller may not perform the action
    Deny,
}

impl Decision {
    /// Whether this decision permits the action
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Trait for the portal's permission-decision service
///
/// Decisions are per-call; the core never caches them. A service failure is
/// not retried and propagates as a 500-class error.
#[async_trait]
pub trait PermissionClient: Send + Sync {
    /// Decide a permission for the caller, optionally against a resource ref
    async fn decide(
        &self,
        identity: &Identity,
        permission: &str,
        resource_ref: Option<&str>,
    ) -> Result<Decision>;
}

/// Wire request sent to the permission endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DecisionRequest<'a> {
    permission: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_ref: Option<&'a str>,
    user: &'a str,
    groups: &'a [String],
}

/// Wire response from the permission endpoint
#[derive(Debug, Deserialize)]
struct DecisionResponse {
    result: Decision,
}

/// Permission client speaking JSON over HTTP to the portal
pub struct HttpPermissionClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpPermissionClient {
    /// Create a client posting decisions to the given endpoint URL
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl PermissionClient for HttpPermissionClient {
    async fn decide(
        &self,
        identity: &Identity,
        permission: &str,
        resource_ref: Option<&str>,
    ) -> Result<Decision> {
        let request = DecisionRequest {
            permission,
            resource_ref,
            user: &identity.user_id,
            groups: &identity.groups,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("permission service unreachable: {e}")))?
            .error_for_status()
            .map_err(|e| Error::upstream(format!("permission service failed: {e}")))?
            .json::<DecisionResponse>()
            .await
            .map_err(|e| Error::upstream(format!("invalid permission service response: {e}")))?;

        debug!(
            permission = %permission,
            user = %identity.user_id,
            decision = ?response.result,
            "Permission decision"
        );

        Ok(response.result)
    }
}

/// Deterministic in-memory permission client for tests
#[cfg(test)]
pub mod fake {
    use std::collections::HashSet;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{Decision, PermissionClient};
    use crate::auth::Identity;
    use crate::Result;

    /// Permission client allowing an explicit set of permissions
    ///
    /// Reference-scoped permissions are keyed as `<permission>@<ref>`.
    pub struct FakePermissions {
        allows: HashSet<String>,
    }

    impl FakePermissions {
        /// Build a client allowing exactly the given permission keys
        pub fn allowing(permissions: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                allows: permissions.iter().map(|p| p.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl PermissionClient for FakePermissions {
        async fn decide(
            &self,
            _identity: &Identity,
            permission: &str,
            resource_ref: Option<&str>,
        ) -> Result<Decision> {
            let key = match resource_ref {
                Some(r) => format!("{permission}@{r}"),
                None => permission.to_string(),
            };
            Ok(if self.allows.contains(&key) {
                Decision::Allow
            } else {
                Decision::Deny
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_names_follow_the_paired_scheme() {
        assert_eq!(
            scoped_permission(RESOURCE_API_KEY, Verb::Update, Scope::All),
            "apikey.update.all"
        );
        assert_eq!(
            scoped_permission(RESOURCE_API_PRODUCT, Verb::Read, Scope::Own),
            "apiproduct.read.own"
        );
        assert_eq!(
            scoped_permission(RESOURCE_API_PRODUCT, Verb::Delete, Scope::All),
            "apiproduct.delete.all"
        );
    }

    #[test]
    fn resource_refs_encode_kind_namespace_and_name() {
        assert_eq!(
            resource_ref("apiproduct", "teamA", "weather"),
            "apiproduct:teamA/weather"
        );
    }

    #[test]
    fn decisions_deserialize_from_wire_format() {
        let allow: Decision = serde_json::from_str("\"ALLOW\"").unwrap();
        assert!(allow.is_allowed());
        let deny: Decision = serde_json::from_str("\"DENY\"").unwrap();
        assert!(!deny.is_allowed());
    }
}
