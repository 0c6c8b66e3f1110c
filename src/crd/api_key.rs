//! APIKey Custom Resource Definition
//!
//! An APIKey represents one consumer's access request (and, once approved,
//! grant) against an APIProduct. It always lives in the namespace of the
//! product it references.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ApiKeyPhase, ApiProductRef, RequestedBy, SecretKeyRef};

/// Specification for an APIKey
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "portal.example.dev",
    version = "v1alpha1",
    kind = "APIKey",
    plural = "apikeys",
    shortname = "apik",
    status = "APIKeyStatus",
    namespaced,
    printcolumn = r#"{"name":"Product","type":"string","jsonPath":".spec.apiProductRef.name"}"#,
    printcolumn = r#"{"name":"Tier","type":"string","jsonPath":".spec.planTier"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct APIKeySpec {
    /// The APIProduct this key grants access to
    #[serde(default)]
    pub api_product_ref: ApiProductRef,

    /// Requested plan tier (must match a tier the product discovers)
    #[serde(default)]
    pub plan_tier: String,

    /// Identity that requested the key; stamped server-side at creation
    #[serde(default)]
    pub requested_by: RequestedBy,

    /// Free-form description of the intended use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_case: Option<String>,
}

/// Status for an APIKey
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct APIKeyStatus {
    /// Review phase; absent means Pending
    #[serde(default)]
    pub phase: ApiKeyPhase,

    /// Identity that approved or rejected the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,

    /// When the request was approved or rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,

    /// Reviewer comment carried alongside the decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Where the external reconciler materialised the credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeyRef>,

    /// Whether the one-time credential read is still available
    ///
    /// Set to true by the reconciler alongside secretRef; flipped to false by
    /// this backend after a successful read. Transitions true to false only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_read_secret: Option<bool>,
}

impl APIKey {
    /// Current review phase; an absent status means Pending
    pub fn phase(&self) -> ApiKeyPhase {
        self.status
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    /// Whether the request still awaits review
    pub fn is_pending(&self) -> bool {
        self.phase() == ApiKeyPhase::Pending
    }

    /// Identity that requested this key
    pub fn requester(&self) -> &str {
        &self.spec.requested_by.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(status: Option<APIKeyStatus>) -> APIKey {
        let mut k = APIKey::new(
            "alice-orders-api-0a1b2c3d",
            APIKeySpec {
                api_product_ref: ApiProductRef {
                    name: "orders-api".into(),
                },
                plan_tier: "gold".into(),
                requested_by: RequestedBy {
                    user_id: "user:default/alice".into(),
                    user_email: None,
                },
                use_case: None,
            },
        );
        k.status = status;
        k
    }

    #[test]
    fn absent_status_means_pending() {
        let k = key(None);
        assert_eq!(k.phase(), ApiKeyPhase::Pending);
        assert!(k.is_pending());
    }

    #[test]
    fn present_status_with_default_phase_is_still_pending() {
        let k = key(Some(APIKeyStatus::default()));
        assert!(k.is_pending());
    }

    #[test]
    fn approved_phase_is_not_pending() {
        let k = key(Some(APIKeyStatus {
            phase: ApiKeyPhase::Approved,
            ..Default::default()
        }));
        assert!(!k.is_pending());
    }

    #[test]
    fn status_deserializes_from_camel_case() {
        let k: APIKey = serde_json::from_value(serde_json::json!({
            "apiVersion": "portal.example.dev/v1alpha1",
            "kind": "APIKey",
            "metadata": {"name": "bob-weather-00ff00ff", "namespace": "teamA"},
            "spec": {
                "apiProductRef": {"name": "weather"},
                "planTier": "bronze",
                "requestedBy": {"userId": "user:default/bob"}
            },
            "status": {
                "phase": "Approved",
                "secretRef": {"name": "sec1", "key": "api_key"},
                "canReadSecret": true
            }
        }))
        .unwrap();

        assert_eq!(k.phase(), ApiKeyPhase::Approved);
        assert_eq!(k.requester(), "user:default/bob");
        let status = k.status.unwrap();
        assert_eq!(status.secret_ref.unwrap().key, "api_key");
        assert_eq!(status.can_read_secret, Some(true));
    }
}
