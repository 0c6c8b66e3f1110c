//! APIProduct Custom Resource Definition
//!
//! An APIProduct represents a published API backed by a route binding.
//! Ownership is recorded in a single annotation stamped at creation time;
//! that annotation is the root of all ownership-based authorization.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ApprovalMode, DiscoveredPlans, PublishStatus, TargetRef};
use super::{LIFECYCLE_LABEL, LIFECYCLE_RETIRED, OWNER_ANNOTATION};

/// Specification for an APIProduct
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "portal.example.dev",
    version = "v1alpha1",
    kind = "APIProduct",
    plural = "apiproducts",
    shortname = "apip",
    status = "APIProductStatus",
    namespaced,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".spec.publishStatus"}"#,
    printcolumn = r#"{"name":"Approval","type":"string","jsonPath":".spec.approvalMode"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct APIProductSpec {
    /// Human-readable product name shown in the portal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Product description shown in the portal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Publication state; Draft products are hidden from consumers
    #[serde(default)]
    pub publish_status: PublishStatus,

    /// Route binding this product publishes
    pub target_ref: TargetRef,

    /// How access requests are approved
    #[serde(default)]
    pub approval_mode: ApprovalMode,
}

impl APIProductSpec {
    /// Validate the product specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.target_ref.validate()
    }
}

/// Status for an APIProduct
///
/// Written by an external controller; this backend only reads it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct APIProductStatus {
    /// Plan tiers discovered from the route's rate-limit policies
    #[serde(default, skip_serializing_if = "DiscoveredPlans::is_empty")]
    pub discovered_plans: DiscoveredPlans,
}

impl APIProduct {
    /// The owning user identity, if the owner annotation is present
    ///
    /// A product with no owner annotation cannot be ownership-checked and is
    /// therefore inaccessible to "-own"-scoped callers.
    pub fn owner(&self) -> Option<&str> {
        self.annotations().get(OWNER_ANNOTATION).map(String::as_str)
    }

    /// Whether the product is visible to consumers
    pub fn is_published(&self) -> bool {
        self.spec.publish_status == PublishStatus::Published
    }

    /// The lifecycle label value, if set
    pub fn lifecycle(&self) -> Option<&str> {
        self.labels().get(LIFECYCLE_LABEL).map(String::as_str)
    }

    /// Whether the lifecycle label marks this product as retired
    pub fn is_retired(&self) -> bool {
        self.lifecycle() == Some(LIFECYCLE_RETIRED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(owner: Option<&str>) -> APIProduct {
        let mut p = APIProduct::new(
            "orders-api",
            APIProductSpec {
                display_name: Some("Orders API".into()),
                description: None,
                publish_status: PublishStatus::Draft,
                target_ref: TargetRef {
                    name: "orders-route".into(),
                    kind: "HTTPRoute".into(),
                    namespace: "teamA".into(),
                },
                approval_mode: ApprovalMode::Manual,
            },
        );
        if let Some(user) = owner {
            p.annotations_mut()
                .insert(OWNER_ANNOTATION.to_string(), user.to_string());
        }
        p
    }

    #[test]
    fn owner_comes_from_the_annotation_alone() {
        let owned = product(Some("user:default/alice"));
        assert_eq!(owned.owner(), Some("user:default/alice"));

        // No annotation means no owner, not an empty owner
        let unowned = product(None);
        assert_eq!(unowned.owner(), None);
    }

    #[test]
    fn lifecycle_label_drives_retirement() {
        let mut p = product(Some("user:default/alice"));
        assert!(!p.is_retired());

        p.labels_mut()
            .insert(LIFECYCLE_LABEL.to_string(), LIFECYCLE_RETIRED.to_string());
        assert!(p.is_retired());
        assert_eq!(p.lifecycle(), Some("retired"));
    }

    #[test]
    fn spec_serializes_camel_case() {
        let p = product(None);
        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["spec"]["publishStatus"], "Draft");
        assert_eq!(value["spec"]["targetRef"]["kind"], "HTTPRoute");
        assert_eq!(value["apiVersion"], "portal.example.dev/v1alpha1");
        assert_eq!(value["kind"], "APIProduct");
    }
}
