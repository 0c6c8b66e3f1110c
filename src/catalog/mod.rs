//! Published-product sync into the portal catalog
//!
//! Pushes every Published APIProduct to the portal's catalog endpoint so the
//! portal UI can list them. Runs on a timer and on demand after product
//! mutations. Consumes the resource gateway's list operation only; a failed
//! push is logged and retried on the next pass, never surfaced to the
//! request that triggered it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::APIProduct;
use crate::gateway::{ResourceCoords, ResourceGateway};
use crate::{Error, Result};

/// Trigger for pushing published products into the portal catalog
///
/// Injected into the request orchestrator so product mutations can refresh
/// the catalog immediately instead of waiting for the next timer pass.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CatalogRefresher: Send + Sync {
    /// Push the current set of published products to the catalog
    async fn refresh(&self) -> Result<()>;
}

/// Catalog entity derived from a Published APIProduct
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntity {
    /// Product name
    pub name: String,
    /// Product namespace
    pub namespace: String,
    /// Display title, falling back to the product name
    pub title: String,
    /// Product description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Discovered plan tier names
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plan_tiers: Vec<String>,
}

impl CatalogEntity {
    /// Build an entity from a product
    pub fn from_product(product: &APIProduct) -> Self {
        use kube::ResourceExt;
        let name = product.name_any();
        Self {
            title: product
                .spec
                .display_name
                .clone()
                .unwrap_or_else(|| name.clone()),
            name,
            namespace: product.namespace().unwrap_or_default(),
            description: product.spec.description.clone(),
            plan_tiers: product
                .status
                .as_ref()
                .map(|s| s.discovered_plans.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

/// Catalog sync provider pushing entities over HTTP
pub struct CatalogSyncProvider {
    gateway: Arc<dyn ResourceGateway>,
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl CatalogSyncProvider {
    /// Create a provider; without an endpoint, refresh becomes a no-op
    pub fn new(gateway: Arc<dyn ResourceGateway>, endpoint: Option<String>) -> Self {
        Self {
            gateway,
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Collect the published products as catalog entities
    async fn published_entities(&self) -> Result<Vec<CatalogEntity>> {
        let values = self
            .gateway
            .list(&ResourceCoords::api_products_all())
            .await?;

        let entities = values
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<APIProduct>(v) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed APIProduct during catalog sync");
                    None
                }
            })
            .filter(APIProduct::is_published)
            .map(|p| CatalogEntity::from_product(&p))
            .collect();

        Ok(entities)
    }
}

#[async_trait]
impl CatalogRefresher for CatalogSyncProvider {
    async fn refresh(&self) -> Result<()> {
        let entities = self.published_entities().await?;

        let Some(endpoint) = &self.endpoint else {
            debug!(
                count = entities.len(),
                "No catalog endpoint configured, skipping push"
            );
            return Ok(());
        };

        self.http
            .post(endpoint)
            .json(&serde_json::json!({"entities": entities}))
            .send()
            .await
            .map_err(|e| Error::upstream(format!("catalog push failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::upstream(format!("catalog push rejected: {e}")))?;

        info!(count = entities.len(), "Pushed published API products to catalog");
        Ok(())
    }
}

/// Run refresh on a fixed interval until the task is aborted
pub fn spawn_periodic_sync(
    provider: Arc<CatalogSyncProvider>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = provider.refresh().await {
                warn!(error = %e, "Catalog sync pass failed, will retry next interval");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockResourceGateway;
    use serde_json::json;

    fn product_value(name: &str, published: bool, title: Option<&str>) -> serde_json::Value {
        json!({
            "apiVersion": "portal.example.dev/v1alpha1",
            "kind": "APIProduct",
            "metadata": {"name": name, "namespace": "teamA"},
            "spec": {
                "displayName": title,
                "publishStatus": if published { "Published" } else { "Draft" },
                "targetRef": {"name": "r", "kind": "HTTPRoute", "namespace": "teamA"}
            },
            "status": {
                "discoveredPlans": {"gold": {"limit": 100, "window": "minute"}}
            }
        })
    }

    /// Story: only Published products become catalog entities
    #[tokio::test]
    async fn story_drafts_are_not_synced() {
        let mut gateway = MockResourceGateway::new();
        gateway.expect_list().returning(|_| {
            Ok(vec![
                product_value("orders-api", true, Some("Orders API")),
                product_value("wip-api", false, None),
            ])
        });

        let provider = CatalogSyncProvider::new(Arc::new(gateway), None);
        let entities = provider.published_entities().await.unwrap();

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "orders-api");
        assert_eq!(entities[0].title, "Orders API");
        assert_eq!(entities[0].plan_tiers, vec!["gold"]);
    }

    /// Story: a provider without an endpoint still succeeds quietly
    #[tokio::test]
    async fn story_refresh_without_endpoint_is_a_noop() {
        let mut gateway = MockResourceGateway::new();
        gateway.expect_list().returning(|_| Ok(vec![]));

        let provider = CatalogSyncProvider::new(Arc::new(gateway), None);
        provider.refresh().await.expect("no-op refresh must succeed");
    }

    /// Story: malformed stored resources are skipped, not fatal
    #[tokio::test]
    async fn story_malformed_products_are_skipped() {
        let mut gateway = MockResourceGateway::new();
        gateway.expect_list().returning(|_| {
            Ok(vec![
                json!({"kind": "APIProduct", "metadata": {"name": "broken"}}),
                product_value("orders-api", true, None),
            ])
        });

        let provider = CatalogSyncProvider::new(Arc::new(gateway), None);
        let entities = provider.published_entities().await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].title, "orders-api");
    }
}
