//! Supporting types for the APIProduct and APIKey CRDs

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Publication state of an APIProduct
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum PublishStatus {
    /// Visible to its owner only
    #[default]
    Draft,
    /// Listed for consumers and synced into the portal catalog
    Published,
}

impl std::fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "Draft"),
            Self::Published => write!(f, "Published"),
        }
    }
}

/// How access requests against an APIProduct are approved
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ApprovalMode {
    /// An external controller approves requests without owner review
    Automatic,
    /// The product owner reviews every request (default)
    #[default]
    Manual,
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Route binding an APIProduct publishes
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// Name of the bound route resource
    pub name: String,
    /// Kind of the bound route resource (e.g. HTTPRoute)
    pub kind: String,
    /// Namespace of the bound route resource
    pub namespace: String,
}

impl TargetRef {
    /// Validates that all reference coordinates are present
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.is_empty() || self.kind.is_empty() || self.namespace.is_empty() {
            return Err(crate::Error::input(
                "spec.targetRef.name, spec.targetRef.kind and spec.targetRef.namespace are required",
            ));
        }
        Ok(())
    }
}

/// Rate limits discovered for one plan tier
///
/// Populated by an external controller from the route's rate-limit policies;
/// read-only to this backend.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    /// Request budget within the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// Window the budget applies to (e.g. "minute", "day")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,

    /// Human-readable tier description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Map of plan tier name to its discovered limits
pub type DiscoveredPlans = BTreeMap<String, PlanLimits>;

/// Reference from an APIKey to the APIProduct it grants access to
///
/// The APIKey always lives in the same namespace as the referenced product,
/// so only the name is carried.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiProductRef {
    /// Name of the referenced APIProduct
    #[serde(default)]
    pub name: String,
}

/// Identity that requested an APIKey
///
/// Stamped from the resolved caller identity at creation; a client-supplied
/// user id is never trusted.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestedBy {
    /// Stable user identifier (e.g. "user:default/alice")
    #[serde(default)]
    pub user_id: String,

    /// Contact email supplied by the requester
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// Review phase of an APIKey request
///
/// Absent status or absent phase both mean Pending. Approved and Rejected
/// are terminal: only Pending keys may be edited by their requester.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiKeyPhase {
    /// Awaiting owner review (default when status is absent)
    #[default]
    Pending,
    /// Granted; an external reconciler materialises the credential
    Approved,
    /// Denied by the owner
    Rejected,
}

impl std::fmt::Display for ApiKeyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Approved => write!(f, "Approved"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Location of the materialised credential for an approved APIKey
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Secret name in the APIKey's namespace
    pub name: String,
    /// Key within the Secret's data holding the credential
    pub key: String,
}
