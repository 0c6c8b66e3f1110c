//! Thin typed wrapper over the Kubernetes API
//!
//! Issues get/list/create/patch/delete calls for arbitrary
//! (group, version, namespace, resource) coordinates via the dynamic API,
//! plus Secret-specific operations via the typed core/v1 client. Owns no
//! state: every call is a single synchronous round trip with no built-in
//! retry, and nothing is cached between calls.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::Client;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::crd::{GROUP, VERSION};
use crate::{Error, Result};

/// Coordinates addressing one Kubernetes resource collection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceCoords {
    /// API group ("" for the core group)
    pub group: String,
    /// API version
    pub version: String,
    /// Resource kind (e.g. "APIProduct")
    pub kind: String,
    /// Plural resource name (e.g. "apiproducts")
    pub plural: String,
    /// Namespace, or None for a cluster-wide collection
    pub namespace: Option<String>,
}

impl ResourceCoords {
    /// Coordinates for a namespaced collection
    pub fn namespaced(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Coordinates for APIProducts in one namespace
    pub fn api_products(namespace: impl Into<String>) -> Self {
        Self::namespaced(GROUP, VERSION, "APIProduct", "apiproducts", namespace)
    }

    /// Coordinates for APIProducts across all namespaces
    pub fn api_products_all() -> Self {
        Self {
            namespace: None,
            ..Self::api_products("")
        }
    }

    /// Coordinates for APIKeys in one namespace
    pub fn api_keys(namespace: impl Into<String>) -> Self {
        Self::namespaced(GROUP, VERSION, "APIKey", "apikeys", namespace)
    }

    /// Coordinates for APIKeys across all namespaces
    pub fn api_keys_all() -> Self {
        Self {
            namespace: None,
            ..Self::api_keys("")
        }
    }

    fn api_resource(&self) -> ApiResource {
        let api_version = if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        };
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version,
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

/// Trait abstracting the Kubernetes API for the portal core
///
/// Production uses [`KubeGateway`]; tests mock this trait so the cascade,
/// bulk and disclosure logic can be exercised without a cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    /// Fetch a single resource
    async fn get(&self, coords: &ResourceCoords, name: &str) -> Result<Value>;

    /// List a resource collection
    async fn list(&self, coords: &ResourceCoords) -> Result<Vec<Value>>;

    /// Create a resource from its JSON representation
    async fn create(&self, coords: &ResourceCoords, body: &Value) -> Result<Value>;

    /// Merge-patch a resource
    async fn patch(&self, coords: &ResourceCoords, name: &str, patch: &Value) -> Result<Value>;

    /// Merge-patch a resource's status subresource
    async fn patch_status(
        &self,
        coords: &ResourceCoords,
        name: &str,
        patch: &Value,
    ) -> Result<Value>;

    /// Delete a resource
    async fn delete(&self, coords: &ResourceCoords, name: &str) -> Result<()>;

    /// Fetch a Secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    /// List Secrets in a namespace
    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>>;

    /// Create a Secret
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret>;

    /// Delete a Secret
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Production gateway backed by a kube [`Client`]
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    /// Create a new gateway wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, coords: &ResourceCoords) -> Api<DynamicObject> {
        let ar = coords.api_resource();
        match &coords.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn to_value(obj: DynamicObject) -> Result<Value> {
    serde_json::to_value(obj).map_err(|e| Error::internal(format!("failed to encode resource: {e}")))
}

#[async_trait]
impl ResourceGateway for KubeGateway {
    async fn get(&self, coords: &ResourceCoords, name: &str) -> Result<Value> {
        let obj = self.api(coords).get(name).await?;
        to_value(obj)
    }

    async fn list(&self, coords: &ResourceCoords) -> Result<Vec<Value>> {
        let list = self.api(coords).list(&ListParams::default()).await?;
        list.items.into_iter().map(to_value).collect()
    }

    async fn create(&self, coords: &ResourceCoords, body: &Value) -> Result<Value> {
        let obj: DynamicObject = serde_json::from_value(body.clone())
            .map_err(|e| Error::internal(format!("failed to build resource: {e}")))?;
        let created = self.api(coords).create(&PostParams::default(), &obj).await?;
        to_value(created)
    }

    async fn patch(&self, coords: &ResourceCoords, name: &str, patch: &Value) -> Result<Value> {
        let patched = self
            .api(coords)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        to_value(patched)
    }

    async fn patch_status(
        &self,
        coords: &ResourceCoords,
        name: &str,
        patch: &Value,
    ) -> Result<Value> {
        let patched = self
            .api(coords)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        to_value(patched)
    }

    async fn delete(&self, coords: &ResourceCoords, name: &str) -> Result<()> {
        self.api(coords).delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        Ok(self.secrets(namespace).get(name).await?)
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<Secret>> {
        let list = self
            .secrets(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        Ok(self
            .secrets(namespace)
            .create(&PostParams::default(), secret)
            .await?)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coords_build_grouped_api_resource() {
        let coords = ResourceCoords::api_products("teamA");
        let ar = coords.api_resource();
        assert_eq!(ar.api_version, "portal.example.dev/v1alpha1");
        assert_eq!(ar.plural, "apiproducts");
        assert_eq!(coords.namespace.as_deref(), Some("teamA"));
    }

    #[test]
    fn coords_build_core_group_api_resource() {
        let coords = ResourceCoords::namespaced("", "v1", "ConfigMap", "configmaps", "default");
        assert_eq!(coords.api_resource().api_version, "v1");
    }

    #[test]
    fn all_namespace_coords_have_no_namespace() {
        assert_eq!(ResourceCoords::api_keys_all().namespace, None);
        assert_eq!(
            ResourceCoords::api_keys("teamA").namespace.as_deref(),
            Some("teamA")
        );
    }
}
