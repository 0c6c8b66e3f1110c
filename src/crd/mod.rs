//! Custom Resource Definitions for the API portal
//!
//! This module contains the CRD definitions the portal operates on.

mod api_key;
mod api_product;
mod types;

pub use api_key::{APIKey, APIKeySpec, APIKeyStatus};
pub use api_product::{APIProduct, APIProductSpec, APIProductStatus};
pub use types::{
    ApiKeyPhase, ApiProductRef, ApprovalMode, DiscoveredPlans, PlanLimits, PublishStatus,
    RequestedBy, SecretKeyRef, TargetRef,
};

/// API group for portal custom resources
pub const GROUP: &str = "portal.example.dev";

/// API version for portal custom resources
pub const VERSION: &str = "v1alpha1";

/// Annotation recording the user identity that owns an APIProduct
///
/// This is the sole ownership signal. It is stamped from the caller's
/// identity at creation and immutable thereafter except by an admin.
pub const OWNER_ANNOTATION: &str = "portal.example.dev/owner";

/// Label carrying an APIProduct's lifecycle stage
pub const LIFECYCLE_LABEL: &str = "portal.example.dev/lifecycle";

/// Lifecycle label value marking a product as retired
pub const LIFECYCLE_RETIRED: &str = "retired";
