//! The two-tier authorization cascade
//!
//! Every action on an APIProduct or APIKey resolves through the same
//! procedure, whether it arrives as a single request or as one line of a
//! bulk batch:
//!
//! 1. The "-all" permission variant is checked first. ALLOW short-circuits
//!    before any resource fetch: an admin must never pay the cost (or the
//!    failure modes) of an ownership lookup, and may act on resources that
//!    are not yet fetchable for them.
//! 2. The "-own" variant is checked next; DENY ends the cascade.
//! 3. Otherwise ownership is re-derived from the authoritative resource.
//!    For APIKey review actions that means fetching the *referenced
//!    APIProduct*, not the key itself; client-supplied identifiers are never
//!    trusted for ownership.
//!
//! Ownership is looked up fresh on every call. There is no cache and no
//! denormalisation.

use std::sync::Arc;

use tracing::debug;

use crate::auth::identity::Identity;
use crate::auth::permissions::{
    resource_ref, scoped_permission, PermissionClient, Scope, Verb, PERMISSION_API_KEY_CREATE,
    PERMISSION_API_PRODUCT_CREATE, RESOURCE_API_KEY,
};
use crate::crd::{APIKey, APIProduct};
use crate::gateway::{ResourceCoords, ResourceGateway};
use crate::{Error, Result};

/// Which tier of the permission pair admitted the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    /// "-all" variant: ownership checks are skipped entirely
    All,
    /// "-own" variant: the caller must own the resource acted on
    Own,
}

/// Reusable decision procedure combining permission decisions with
/// ownership lookups
pub struct AuthorizationResolver {
    permissions: Arc<dyn PermissionClient>,
    gateway: Arc<dyn ResourceGateway>,
}

impl AuthorizationResolver {
    /// Create a resolver over the given collaborators
    pub fn new(
        permissions: Arc<dyn PermissionClient>,
        gateway: Arc<dyn ResourceGateway>,
    ) -> Self {
        Self {
            permissions,
            gateway,
        }
    }

    /// Resolve which tier of the own/all pair admits the caller
    ///
    /// Returns [`Tier::All`] without touching the "-own" variant when the
    /// admin permission is held; fails with 403 when neither variant is.
    pub async fn resolve_tier(
        &self,
        identity: &Identity,
        resource: &str,
        verb: Verb,
    ) -> Result<Tier> {
        let all = scoped_permission(resource, verb, Scope::All);
        if self.permissions.decide(identity, &all, None).await?.is_allowed() {
            debug!(user = %identity.user_id, permission = %all, "Admin tier admitted");
            return Ok(Tier::All);
        }

        let own = scoped_permission(resource, verb, Scope::Own);
        if self.permissions.decide(identity, &own, None).await?.is_allowed() {
            return Ok(Tier::Own);
        }

        Err(Error::forbidden("unauthorised"))
    }

    /// Full cascade for approving/rejecting an APIKey
    ///
    /// Ownership resolves through the referenced APIProduct's owner
    /// annotation. `denial` is the reason returned on an ownership mismatch.
    pub async fn authorize_key_update(
        &self,
        identity: &Identity,
        namespace: &str,
        product_name: &str,
        denial: &str,
    ) -> Result<()> {
        if self
            .resolve_tier(identity, RESOURCE_API_KEY, Verb::Update)
            .await?
            == Tier::All
        {
            return Ok(());
        }
        self.require_product_owner_by_ref(identity, namespace, product_name, denial)
            .await
    }

    /// Fetch the named APIProduct and require the caller to own it
    ///
    /// A failed product fetch is the caller's problem to fix (a dangling
    /// reference), not an authorization failure, so it surfaces as an input
    /// error rather than a 403.
    pub async fn require_product_owner_by_ref(
        &self,
        identity: &Identity,
        namespace: &str,
        product_name: &str,
        denial: &str,
    ) -> Result<()> {
        let product = self.fetch_product(namespace, product_name).await?;
        require_product_owner(identity, &product, denial)
    }

    /// Ownership lookup: fetch the authoritative APIProduct
    pub async fn fetch_product(&self, namespace: &str, name: &str) -> Result<APIProduct> {
        let value = self
            .gateway
            .get(&ResourceCoords::api_products(namespace), name)
            .await
            .map_err(|e| Error::input(e.to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| Error::internal(format!("invalid APIProduct resource: {e}")))
    }

    /// Resource-scoped key-creation permission
    ///
    /// Creation has no pre-existing owner to compare against, so the
    /// decision is delegated entirely to the permission service with a
    /// reference to the targeted product.
    pub async fn authorize_create_key(
        &self,
        identity: &Identity,
        namespace: &str,
        product_name: &str,
    ) -> Result<()> {
        let reference = resource_ref("apiproduct", namespace, product_name);
        if self
            .permissions
            .decide(identity, PERMISSION_API_KEY_CREATE, Some(&reference))
            .await?
            .is_allowed()
        {
            Ok(())
        } else {
            Err(Error::forbidden("unauthorised"))
        }
    }

    /// Product-creation permission
    pub async fn authorize_create_product(&self, identity: &Identity) -> Result<()> {
        if self
            .permissions
            .decide(identity, PERMISSION_API_PRODUCT_CREATE, None)
            .await?
            .is_allowed()
        {
            Ok(())
        } else {
            Err(Error::forbidden("unauthorised"))
        }
    }

    /// Whether the caller holds producer capabilities over APIProducts
    ///
    /// Used for draft hiding: callers with neither create nor update-own
    /// capability only ever see Published products in listings.
    pub async fn is_producer(&self, identity: &Identity) -> Result<bool> {
        if self
            .permissions
            .decide(identity, PERMISSION_API_PRODUCT_CREATE, None)
            .await?
            .is_allowed()
        {
            return Ok(true);
        }
        let update_own = scoped_permission(
            crate::auth::permissions::RESOURCE_API_PRODUCT,
            Verb::Update,
            Scope::Own,
        );
        Ok(self
            .permissions
            .decide(identity, &update_own, None)
            .await?
            .is_allowed())
    }
}

/// Require structural equality between the caller and a product's owner
pub fn require_product_owner(
    identity: &Identity,
    product: &APIProduct,
    denial: &str,
) -> Result<()> {
    match product.owner() {
        Some(owner) if owner == identity.user_id => Ok(()),
        _ => Err(Error::forbidden(denial)),
    }
}

/// Require structural equality between the caller and a key's requester
pub fn require_requester(identity: &Identity, key: &APIKey, denial: &str) -> Result<()> {
    if !key.requester().is_empty() && key.requester() == identity.user_id {
        Ok(())
    } else {
        Err(Error::forbidden(denial))
    }
}
