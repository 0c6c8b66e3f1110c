//! APIProduct endpoints
//!
//! Listing applies two filters in sequence: an ownership filter for "-own"
//! readers, then a coarser draft-hiding filter for callers with no producer
//! capability. Deletion cascades over the product's APIKeys with best-effort
//! semantics. Patching applies an allow-listed subset of fields only and
//! enforces the retired/published exclusivity rules.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::resolver::require_product_owner;
use crate::auth::{Tier, Verb, RESOURCE_API_PRODUCT};
use crate::crd::{
    APIKey, APIProduct, APIProductSpec, ApprovalMode, PublishStatus, TargetRef, LIFECYCLE_LABEL,
    LIFECYCLE_RETIRED, OWNER_ANNOTATION,
};
use crate::gateway::ResourceCoords;
use crate::server::{parse_body, parse_resource, AppState};
use crate::{Error, Result};

const VIEW_DENIAL: &str = "You can only view your own API products.";
const UPDATE_DENIAL: &str = "You can only update your own API products.";
const DELETE_DENIAL: &str = "You can only delete your own API products.";

/// `GET /apiproducts`
///
/// "-all" readers get the unfiltered collection; "-own" readers get the
/// collection trimmed in memory to products they own. Afterwards, callers
/// holding neither create nor update capability see only Published items.
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(&headers).await?;
    let resolver = state.resolver();

    let tier = resolver
        .resolve_tier(&identity, RESOURCE_API_PRODUCT, Verb::Read)
        .await?;

    let values = state
        .gateway
        .list(&ResourceCoords::api_products_all())
        .await?;
    let mut products: Vec<APIProduct> = values
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "Skipping malformed APIProduct in listing");
                None
            }
        })
        .collect();

    if tier == Tier::Own {
        products.retain(|p| p.owner() == Some(identity.user_id.as_str()));
    }

    // Draft hiding: pure consumers only ever see published products.
    if !resolver.is_producer(&identity).await? {
        products.retain(APIProduct::is_published);
    }

    Ok(Json(json!({"items": products})))
}

/// `GET /apiproducts/{namespace}/{name}`
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(&headers).await?;
    let tier = state
        .resolver()
        .resolve_tier(&identity, RESOURCE_API_PRODUCT, Verb::Read)
        .await?;

    let value = state
        .gateway
        .get(&ResourceCoords::api_products(&namespace), &name)
        .await?;

    if tier == Tier::Own {
        let product: APIProduct = parse_resource(value.clone())?;
        require_product_owner(&identity, &product, VIEW_DENIAL)?;
    }

    Ok(Json(value))
}

/// `GET /apiproducts/{namespace}/{name}/plans`
///
/// Read-only passthrough of the plan tiers an external controller
/// discovered for the product.
pub async fn plans(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(&headers).await?;
    let tier = state
        .resolver()
        .resolve_tier(&identity, RESOURCE_API_PRODUCT, Verb::Read)
        .await?;

    let value = state
        .gateway
        .get(&ResourceCoords::api_products(&namespace), &name)
        .await?;
    let product: APIProduct = parse_resource(value)?;

    if tier == Tier::Own {
        require_product_owner(&identity, &product, VIEW_DENIAL)?;
    }

    let plans = product
        .status
        .map(|s| s.discovered_plans)
        .unwrap_or_default();
    Ok(Json(json!({"plans": plans})))
}

/// Body for `POST /apiproducts`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiProductRequest {
    /// Resource name
    #[serde(default)]
    pub name: String,
    /// Resource namespace
    #[serde(default)]
    pub namespace: String,
    /// Initial labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Initial annotations; any owner annotation is overwritten server-side
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Product specification; targetRef coordinates are required
    pub spec: APIProductSpec,
}

/// `POST /apiproducts`
///
/// The owner annotation is stamped from the resolved caller identity, never
/// taken from the request body.
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>)> {
    let identity = state.identity.resolve(&headers).await?;
    state.resolver().authorize_create_product(&identity).await?;

    let req: CreateApiProductRequest = parse_body(body)?;
    if req.name.is_empty() || req.namespace.is_empty() {
        return Err(Error::input("name and namespace are required"));
    }
    req.spec.validate()?;

    let mut product = APIProduct::new(&req.name, req.spec);
    product.metadata.namespace = Some(req.namespace.clone());
    if !req.labels.is_empty() {
        product.metadata.labels = Some(req.labels);
    }
    let mut annotations = req.annotations;
    annotations.insert(OWNER_ANNOTATION.to_string(), identity.user_id.clone());
    product.metadata.annotations = Some(annotations);

    let value = serde_json::to_value(&product)
        .map_err(|e| Error::internal(format!("failed to encode APIProduct: {e}")))?;
    let created = state
        .gateway
        .create(&ResourceCoords::api_products(&req.namespace), &value)
        .await?;

    info!(
        api_product = %req.name,
        namespace = %req.namespace,
        owner = %identity.user_id,
        "Created API product"
    );
    state.refresh_catalog().await;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Allow-listed spec fields accepted by `PATCH /apiproducts/...`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchApiProductSpec {
    /// New display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New publication state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_status: Option<PublishStatus>,
    /// New approval mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_mode: Option<ApprovalMode>,
    /// New route binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<TargetRef>,
}

/// Allow-listed metadata fields accepted by `PATCH /apiproducts/...`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PatchApiProductMetadata {
    /// Label changes to merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Annotation changes to merge; the owner annotation is stripped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Body for `PATCH /apiproducts/{namespace}/{name}`
///
/// Deserialising through this struct is the allow-list: fields outside it
/// never reach the stored resource.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PatchApiProductRequest {
    /// Spec changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<PatchApiProductSpec>,
    /// Metadata changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PatchApiProductMetadata>,
}

impl PatchApiProductRequest {
    /// The lifecycle label this patch sets, if any
    fn lifecycle(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .labels
            .as_ref()?
            .get(LIFECYCLE_LABEL)
            .map(String::as_str)
    }

    /// The publish status this patch sets, if any
    fn publish_status(&self) -> Option<&PublishStatus> {
        self.spec.as_ref()?.publish_status.as_ref()
    }

    /// Drop the owner annotation: it is immutable after creation
    fn sanitized(mut self) -> Self {
        if let Some(metadata) = self.metadata.as_mut() {
            if let Some(annotations) = metadata.annotations.as_mut() {
                annotations.remove(OWNER_ANNOTATION);
            }
        }
        self
    }
}

/// `PATCH /apiproducts/{namespace}/{name}`
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(&headers).await?;
    let resolver = state.resolver();
    let coords = ResourceCoords::api_products(&namespace);

    let tier = resolver
        .resolve_tier(&identity, RESOURCE_API_PRODUCT, Verb::Update)
        .await?;
    if tier == Tier::Own {
        let value = state.gateway.get(&coords, &name).await?;
        let product: APIProduct = parse_resource(value)?;
        require_product_owner(&identity, &product, UPDATE_DENIAL)?;
    }

    let req: PatchApiProductRequest = parse_body(body)?;
    let req = req.sanitized();

    // A retired product cannot be published, whether the label arrives in
    // this patch or is already stored.
    if req.publish_status() == Some(&PublishStatus::Published) {
        if req.lifecycle() == Some(LIFECYCLE_RETIRED) {
            return Err(Error::input("a retired API product cannot be published"));
        }
        if req.lifecycle().is_none() {
            let value = state.gateway.get(&coords, &name).await?;
            let current: APIProduct = parse_resource(value)?;
            if current.is_retired() {
                return Err(Error::input("a retired API product cannot be published"));
            }
        }
    }

    // Retiring a published product silently forces it back to Draft before
    // the main patch, decided on a freshly fetched copy.
    if req.lifecycle() == Some(LIFECYCLE_RETIRED) {
        let value = state.gateway.get(&coords, &name).await?;
        let fresh: APIProduct = parse_resource(value)?;
        if fresh.is_published() {
            state
                .gateway
                .patch(&coords, &name, &json!({"spec": {"publishStatus": "Draft"}}))
                .await?;
            info!(
                api_product = %name,
                namespace = %namespace,
                "Unpublished API product being retired"
            );
        }
    }

    let patch = serde_json::to_value(&req)
        .map_err(|e| Error::internal(format!("failed to encode patch: {e}")))?;
    let updated = state.gateway.patch(&coords, &name, &patch).await?;

    info!(api_product = %name, namespace = %namespace, "Patched API product");
    state.refresh_catalog().await;

    Ok(Json(updated))
}

/// `DELETE /apiproducts/{namespace}/{name}`
///
/// Deletes the product's APIKeys first, best-effort: individual failures are
/// logged and never block deletion of the product itself. Secret cleanup is
/// left to the external reconciler's owner references.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let identity = state.identity.resolve(&headers).await?;
    let resolver = state.resolver();
    let product_coords = ResourceCoords::api_products(&namespace);

    let tier = resolver
        .resolve_tier(&identity, RESOURCE_API_PRODUCT, Verb::Delete)
        .await?;
    if tier == Tier::Own {
        let value = state.gateway.get(&product_coords, &name).await?;
        let product: APIProduct = parse_resource(value)?;
        require_product_owner(&identity, &product, DELETE_DENIAL)?;
    }

    let key_coords = ResourceCoords::api_keys(&namespace);
    match state.gateway.list(&key_coords).await {
        Ok(values) => {
            for value in values {
                let Ok(key) = serde_json::from_value::<APIKey>(value) else {
                    continue;
                };
                if key.spec.api_product_ref.name != name {
                    continue;
                }
                let key_name = key.name_any();
                if let Err(e) = state.gateway.delete(&key_coords, &key_name).await {
                    warn!(
                        api_key = %key_name,
                        namespace = %namespace,
                        error = %e,
                        "Failed to delete API key during cascading delete"
                    );
                }
            }
        }
        Err(e) => warn!(
            api_product = %name,
            namespace = %namespace,
            error = %e,
            "Failed to list API keys for cascading delete"
        ),
    }

    state.gateway.delete(&product_coords, &name).await?;

    info!(api_product = %name, namespace = %namespace, "Deleted API product");
    state.refresh_catalog().await;

    Ok(StatusCode::NO_CONTENT)
}
