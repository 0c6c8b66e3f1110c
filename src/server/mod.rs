//! HTTP surface for the API portal backend
//!
//! Request handling is an explicit sequential pipeline: resolve identity,
//! authorize through the two-tier cascade, execute against the resource
//! gateway, shape the JSON response. Handlers hold no cross-request state;
//! every request makes its own independent sequence of gateway and
//! permission calls.

pub mod apikeys;
pub mod products;
pub mod requests;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::auth::{AuthorizationResolver, IdentityResolver, PermissionClient};
use crate::catalog::CatalogRefresher;
use crate::disclosure::SecretDisclosure;
use crate::gateway::ResourceGateway;
use crate::{Error, Result};

/// Shared state for all handlers
pub struct AppState {
    /// Kubernetes resource gateway
    pub gateway: Arc<dyn ResourceGateway>,
    /// Permission-decision service client
    pub permissions: Arc<dyn PermissionClient>,
    /// Caller identity resolver
    pub identity: Arc<dyn IdentityResolver>,
    /// Catalog refresher triggered after product mutations
    pub catalog: Arc<dyn CatalogRefresher>,
}

impl AppState {
    /// Create the shared state from its collaborators
    pub fn new(
        gateway: Arc<dyn ResourceGateway>,
        permissions: Arc<dyn PermissionClient>,
        identity: Arc<dyn IdentityResolver>,
        catalog: Arc<dyn CatalogRefresher>,
    ) -> Self {
        Self {
            gateway,
            permissions,
            identity,
            catalog,
        }
    }

    /// Authorization resolver over this state's collaborators
    pub fn resolver(&self) -> AuthorizationResolver {
        AuthorizationResolver::new(self.permissions.clone(), self.gateway.clone())
    }

    /// Secret disclosure manager over this state's gateway
    pub fn disclosure(&self) -> SecretDisclosure {
        SecretDisclosure::new(self.gateway.clone())
    }

    /// Refresh the catalog, logging failures instead of surfacing them
    pub(crate) async fn refresh_catalog(&self) {
        if let Err(e) = self.catalog.refresh().await {
            warn!(error = %e, "Catalog refresh after mutation failed");
        }
    }
}

/// Parse a request body value, surfacing failures as input errors
pub(crate) fn parse_body<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::input(format!("invalid request body: {e}")))
}

/// Parse a stored resource, surfacing failures as internal errors
pub(crate) fn parse_resource<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::internal(format!("invalid stored resource: {e}")))
}

/// Create the portal router with all endpoints
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/apiproducts", get(products::list).post(products::create))
        .route(
            "/apiproducts/{namespace}/{name}",
            get(products::get_one)
                .patch(products::update)
                .delete(products::remove),
        )
        .route("/apiproducts/{namespace}/{name}/plans", get(products::plans))
        .route("/requests", get(requests::list).post(requests::create))
        .route("/requests/my", get(requests::list_mine))
        .route(
            "/requests/{namespace}/{name}",
            axum::routing::patch(requests::update).delete(requests::remove),
        )
        .route("/requests/{namespace}/{name}/approve", post(requests::approve))
        .route("/requests/{namespace}/{name}/reject", post(requests::reject))
        .route("/requests/bulk-approve", post(requests::bulk_approve))
        .route("/requests/bulk-reject", post(requests::bulk_reject))
        .route("/apikeys/{namespace}/{name}", get(apikeys::get_one))
        .route("/apikeys/{namespace}/{name}/secret", get(apikeys::secret))
        .with_state(state)
}

/// Liveness endpoint
async fn health() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for handler tests

    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderValue};

    use super::AppState;
    use crate::auth::identity::DEFAULT_USER_HEADER;
    use crate::auth::permissions::fake::FakePermissions;
    use crate::auth::HeaderIdentityResolver;
    use crate::catalog::CatalogRefresher;
    use crate::gateway::MockResourceGateway;
    use crate::Result;

    /// Catalog refresher that always succeeds
    pub struct NoopCatalog;

    #[async_trait]
    impl CatalogRefresher for NoopCatalog {
        async fn refresh(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Build an app state over a mock gateway and a fake permission set
    pub fn state(gateway: MockResourceGateway, permissions: Arc<FakePermissions>) -> Arc<AppState> {
        Arc::new(AppState::new(
            Arc::new(gateway),
            permissions,
            Arc::new(HeaderIdentityResolver::default()),
            Arc::new(NoopCatalog),
        ))
    }

    /// Headers authenticating the given user
    pub fn user_headers(user_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(DEFAULT_USER_HEADER, HeaderValue::from_str(user_id).unwrap());
        headers
    }
}
