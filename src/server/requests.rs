//! APIKey request endpoints: create, list, review, bulk review
//!
//! Review (approve/reject) authorizes against the *referenced APIProduct*'s
//! owner, not the key itself. Bulk review resolves the admin bypass once for
//! the whole batch, then processes every item independently: a failing item
//! is recorded in the results array and never aborts the batch. Results come
//! back in input order and the batch as a whole always answers 200.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use kube::ResourceExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::auth::resolver::require_requester;
use crate::auth::{AuthorizationResolver, Identity, Tier, Verb, RESOURCE_API_KEY};
use crate::crd::{APIKey, APIKeySpec, APIProduct, ApiKeyPhase, ApiProductRef, RequestedBy};
use crate::gateway::{ResourceCoords, ResourceGateway};
use crate::server::{parse_body, parse_resource, AppState};
use crate::{Error, Result};

const EDIT_DENIAL: &str = "You can only edit your own API key requests.";
const DELETE_DENIAL: &str = "You can only delete your own API key requests.";
const MISSING_PRODUCT_REF: &str = "API key request is missing its API product reference.";

/// A review decision applied to one or many APIKeys
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewAction {
    /// Grant the request
    Approve,
    /// Deny the request
    Reject,
}

impl ReviewAction {
    fn phase(&self) -> ApiKeyPhase {
        match self {
            Self::Approve => ApiKeyPhase::Approved,
            Self::Reject => ApiKeyPhase::Rejected,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    fn denial(&self) -> &'static str {
        match self {
            Self::Approve => "You can only approve requests for your own API products.",
            Self::Reject => "You can only reject requests for your own API products.",
        }
    }
}

/// Body for `POST /requests`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessRequest {
    /// Name of the APIProduct access is requested for
    #[serde(default)]
    pub api_product_name: String,
    /// Namespace of the APIProduct (and of the created key)
    #[serde(default)]
    pub namespace: String,
    /// Requested plan tier
    #[serde(default)]
    pub plan_tier: String,
    /// Free-form description of the intended use
    #[serde(default)]
    pub use_case: Option<String>,
    /// Contact email
    #[serde(default)]
    pub user_email: Option<String>,
}

/// Derive a Kubernetes-safe APIKey name for a requester and product
///
/// Lower-cases `<user>-<product>-<random4bytesHex>` and replaces every
/// character outside `[a-z0-9-]` with a dash.
pub(crate) fn derive_key_name(user: &str, product: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{user}-{product}-{suffix:08x}")
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// `POST /requests`
///
/// The requester identity is stamped from the resolved caller; a user id in
/// the body is never trusted.
pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>)> {
    let identity = state.identity.resolve(&headers).await?;
    let req: CreateAccessRequest = parse_body(body)?;

    if req.api_product_name.is_empty() || req.namespace.is_empty() || req.plan_tier.is_empty() {
        return Err(Error::input(
            "apiProductName, namespace and planTier are required",
        ));
    }

    state
        .resolver()
        .authorize_create_key(&identity, &req.namespace, &req.api_product_name)
        .await?;

    let name = derive_key_name(identity.short_name(), &req.api_product_name);
    let mut key = APIKey::new(
        &name,
        APIKeySpec {
            api_product_ref: ApiProductRef {
                name: req.api_product_name.clone(),
            },
            plan_tier: req.plan_tier.clone(),
            requested_by: RequestedBy {
                user_id: identity.user_id.clone(),
                user_email: req.user_email.clone(),
            },
            use_case: req.use_case.clone(),
        },
    );
    key.metadata.namespace = Some(req.namespace.clone());

    let value = serde_json::to_value(&key)
        .map_err(|e| Error::internal(format!("failed to encode APIKey: {e}")))?;
    let created = state
        .gateway
        .create(&ResourceCoords::api_keys(&req.namespace), &value)
        .await?;

    info!(
        api_key = %name,
        api_product = %req.api_product_name,
        namespace = %req.namespace,
        requester = %identity.user_id,
        "Created API key request"
    );

    Ok((StatusCode::CREATED, Json(created)))
}

fn collect_keys(values: Vec<Value>) -> Vec<APIKey> {
    values
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(k) => Some(k),
            Err(e) => {
                warn!(error = %e, "Skipping malformed APIKey in listing");
                None
            }
        })
        .collect()
}

/// `GET /requests`
///
/// Producer view: "-all" readers see every request; "-own" readers see the
/// requests targeting products they own. The whole collection is fetched and
/// trimmed in memory; ownership is derived from the product list, never from
/// the keys themselves.
pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(&headers).await?;
    let tier = state
        .resolver()
        .resolve_tier(&identity, RESOURCE_API_KEY, Verb::Read)
        .await?;

    let values = state.gateway.list(&ResourceCoords::api_keys_all()).await?;
    let keys = collect_keys(values);

    let visible: Vec<APIKey> = match tier {
        Tier::All => keys,
        Tier::Own => {
            let products = state
                .gateway
                .list(&ResourceCoords::api_products_all())
                .await?;
            let owned: HashSet<(String, String)> = products
                .into_iter()
                .filter_map(|v| serde_json::from_value::<APIProduct>(v).ok())
                .filter(|p| p.owner() == Some(identity.user_id.as_str()))
                .map(|p| (p.namespace().unwrap_or_default(), p.name_any()))
                .collect();

            keys.into_iter()
                .filter(|k| {
                    owned.contains(&(
                        k.namespace().unwrap_or_default(),
                        k.spec.api_product_ref.name.clone(),
                    ))
                })
                .collect()
        }
    };

    Ok(Json(json!({"items": visible})))
}

/// `GET /requests/my`
///
/// Consumer view: the caller's own requests, whatever their phase.
pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(&headers).await?;
    state
        .resolver()
        .resolve_tier(&identity, RESOURCE_API_KEY, Verb::Read)
        .await?;

    let values = state.gateway.list(&ResourceCoords::api_keys_all()).await?;
    let mine: Vec<APIKey> = collect_keys(values)
        .into_iter()
        .filter(|k| k.requester() == identity.user_id)
        .collect();

    Ok(Json(json!({"items": mine})))
}

/// Optional body for the review endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    /// Reviewer comment recorded on the key
    #[serde(default)]
    pub comment: Option<String>,
}

/// Merge the review outcome into the key's status
///
/// No phase guard: re-reviewing an already-reviewed key overwrites the
/// previous decision, reviewer and timestamp, keeping administrative
/// correction possible.
pub(crate) async fn patch_review_status(
    gateway: &dyn ResourceGateway,
    namespace: &str,
    name: &str,
    action: ReviewAction,
    reviewer: &str,
    comment: Option<&str>,
) -> Result<Value> {
    let mut status = Map::new();
    status.insert("phase".into(), json!(action.phase()));
    status.insert("reviewedBy".into(), json!(reviewer));
    status.insert("reviewedAt".into(), json!(Utc::now()));
    if let Some(comment) = comment {
        status.insert("comment".into(), json!(comment));
    }

    gateway
        .patch_status(
            &ResourceCoords::api_keys(namespace),
            name,
            &json!({"status": status}),
        )
        .await
}

async fn review(
    state: &AppState,
    namespace: &str,
    name: &str,
    headers: &HeaderMap,
    action: ReviewAction,
    comment: Option<String>,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(headers).await?;

    let value = state
        .gateway
        .get(&ResourceCoords::api_keys(namespace), name)
        .await?;
    let key: APIKey = parse_resource(value)?;

    let product_name = key.spec.api_product_ref.name.clone();
    if product_name.is_empty() {
        return Err(Error::input(MISSING_PRODUCT_REF));
    }

    state
        .resolver()
        .authorize_key_update(&identity, namespace, &product_name, action.denial())
        .await?;

    let updated = patch_review_status(
        state.gateway.as_ref(),
        namespace,
        name,
        action,
        &identity.user_id,
        comment.as_deref(),
    )
    .await?;

    info!(
        api_key = %name,
        namespace = %namespace,
        reviewer = %identity.user_id,
        action = action.label(),
        "Reviewed API key request"
    );

    Ok(Json(updated))
}

/// `POST /requests/{namespace}/{name}/approve`
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<Value>> {
    let comment = body.and_then(|Json(b)| b.comment);
    review(&state, &namespace, &name, &headers, ReviewAction::Approve, comment).await
}

/// `POST /requests/{namespace}/{name}/reject`
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Option<Json<ReviewRequest>>,
) -> Result<Json<Value>> {
    let comment = body.and_then(|Json(b)| b.comment);
    review(&state, &namespace, &name, &headers, ReviewAction::Reject, comment).await
}

/// One (namespace, name) pair in a bulk request
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BulkItemRef {
    /// Key namespace
    pub namespace: String,
    /// Key name
    pub name: String,
}

/// Body for the bulk review endpoints
#[derive(Debug, Deserialize)]
pub struct BulkReviewRequest {
    /// Keys to review, processed in order
    #[serde(default)]
    pub requests: Vec<BulkItemRef>,
    /// Comment recorded on every reviewed key
    #[serde(default)]
    pub comment: Option<String>,
}

/// Per-item outcome in a bulk response
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkItemResult {
    /// Key namespace
    pub namespace: String,
    /// Key name
    pub name: String,
    /// Whether this item's review was applied
    pub success: bool,
    /// Failure reason when success is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkItemResult {
    fn succeeded(item: &BulkItemRef) -> Self {
        Self {
            namespace: item.namespace.clone(),
            name: item.name.clone(),
            success: true,
            error: None,
        }
    }

    fn failed(item: &BulkItemRef, error: String) -> Self {
        Self {
            namespace: item.namespace.clone(),
            name: item.name.clone(),
            success: false,
            error: Some(error),
        }
    }
}

/// Process a bulk review batch
///
/// The admin bypass is resolved once for the whole batch; with "-all" held,
/// no item ever fetches its product. Items are processed sequentially and
/// independently; each failure is recorded and the loop continues. Only the
/// pre-flight tier resolution can fail the batch as a whole.
pub(crate) async fn process_bulk(
    gateway: &dyn ResourceGateway,
    resolver: &AuthorizationResolver,
    identity: &Identity,
    action: ReviewAction,
    items: &[BulkItemRef],
    comment: Option<&str>,
) -> Result<Vec<BulkItemResult>> {
    let tier = resolver
        .resolve_tier(identity, RESOURCE_API_KEY, Verb::Update)
        .await?;

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        match process_bulk_item(gateway, resolver, identity, tier, action, item, comment).await {
            Ok(()) => results.push(BulkItemResult::succeeded(item)),
            Err(e) => {
                warn!(
                    api_key = %item.name,
                    namespace = %item.namespace,
                    action = action.label(),
                    error = %e,
                    "Bulk review item failed"
                );
                results.push(BulkItemResult::failed(item, e.to_string()));
            }
        }
    }

    Ok(results)
}

async fn process_bulk_item(
    gateway: &dyn ResourceGateway,
    resolver: &AuthorizationResolver,
    identity: &Identity,
    tier: Tier,
    action: ReviewAction,
    item: &BulkItemRef,
    comment: Option<&str>,
) -> Result<()> {
    let value = gateway
        .get(&ResourceCoords::api_keys(&item.namespace), &item.name)
        .await?;
    let key: APIKey = parse_resource(value)?;

    if tier == Tier::Own {
        let product_name = &key.spec.api_product_ref.name;
        if product_name.is_empty() {
            return Err(Error::input(MISSING_PRODUCT_REF));
        }
        resolver
            .require_product_owner_by_ref(identity, &item.namespace, product_name, action.denial())
            .await?;
    }

    patch_review_status(
        gateway,
        &item.namespace,
        &item.name,
        action,
        &identity.user_id,
        comment,
    )
    .await?;

    Ok(())
}

async fn bulk(
    state: &AppState,
    headers: &HeaderMap,
    action: ReviewAction,
    body: Value,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(headers).await?;
    let req: BulkReviewRequest = parse_body(body)?;
    let resolver = state.resolver();

    let results = process_bulk(
        state.gateway.as_ref(),
        &resolver,
        &identity,
        action,
        &req.requests,
        req.comment.as_deref(),
    )
    .await?;

    Ok(Json(json!({"results": results})))
}

/// `POST /requests/bulk-approve`
pub async fn bulk_approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    bulk(&state, &headers, ReviewAction::Approve, body).await
}

/// `POST /requests/bulk-reject`
pub async fn bulk_reject(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    bulk(&state, &headers, ReviewAction::Reject, body).await
}

/// Editable fields for `PATCH /requests/{namespace}/{name}`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchAccessRequest {
    /// New plan tier
    #[serde(default)]
    pub plan_tier: Option<String>,
    /// New use-case description
    #[serde(default)]
    pub use_case: Option<String>,
    /// New contact email
    #[serde(default)]
    pub user_email: Option<String>,
}

/// `PATCH /requests/{namespace}/{name}`
///
/// Only Pending requests can be edited, and only by their requester (or an
/// admin). Approved and Rejected are terminal for the requester.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(&headers).await?;
    let tier = state
        .resolver()
        .resolve_tier(&identity, RESOURCE_API_KEY, Verb::Update)
        .await?;

    let coords = ResourceCoords::api_keys(&namespace);
    let value = state.gateway.get(&coords, &name).await?;
    let key: APIKey = parse_resource(value.clone())?;

    if tier == Tier::Own {
        require_requester(&identity, &key, EDIT_DENIAL)?;
    }
    if !key.is_pending() {
        return Err(Error::input("only pending API key requests can be edited"));
    }

    let req: PatchAccessRequest = parse_body(body)?;
    let mut spec = Map::new();
    if let Some(plan_tier) = req.plan_tier {
        spec.insert("planTier".into(), json!(plan_tier));
    }
    if let Some(use_case) = req.use_case {
        spec.insert("useCase".into(), json!(use_case));
    }
    if let Some(email) = req.user_email {
        spec.insert("requestedBy".into(), json!({"userEmail": email}));
    }
    if spec.is_empty() {
        return Ok(Json(value));
    }

    let updated = state.gateway.patch(&coords, &name, &json!({"spec": spec})).await?;

    info!(api_key = %name, namespace = %namespace, "Edited API key request");
    Ok(Json(updated))
}

/// `DELETE /requests/{namespace}/{name}`
///
/// The underlying Secret is not touched here; its cleanup belongs to the
/// external reconciler's owner references.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let identity = state.identity.resolve(&headers).await?;
    let tier = state
        .resolver()
        .resolve_tier(&identity, RESOURCE_API_KEY, Verb::Delete)
        .await?;

    let coords = ResourceCoords::api_keys(&namespace);
    if tier == Tier::Own {
        let value = state.gateway.get(&coords, &name).await?;
        let key: APIKey = parse_resource(value)?;
        require_requester(&identity, &key, DELETE_DENIAL)?;
    }

    state.gateway.delete(&coords, &name).await?;

    info!(api_key = %name, namespace = %namespace, "Deleted API key request");
    Ok(StatusCode::NO_CONTENT)
}
