//! Show-once secret disclosure
//!
//! Governs how an approved APIKey's credential is revealed to its requester.
//! Per key the states are:
//!
//! ```text
//! Unreadable (no secretRef yet)
//!     -> Readable (secretRef present, canReadSecret still true)
//!     -> Consumed (canReadSecret = false)
//! ```
//!
//! Readable -> Consumed is the only transition this backend performs, and it
//! is one-way: nothing resets a Consumed key. The flag is checked before the
//! Secret store is ever touched, so repeated reads never reach the Secret;
//! and the flag is flipped only after the value was actually decoded, so a
//! transient Secret failure does not burn the one read the requester gets.
//! The decode and the flag flip are two calls against two resource kinds and
//! are not atomic; a crash between them re-opens the read window, which is
//! accepted.

use std::sync::Arc;

use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info};

use crate::crd::APIKey;
use crate::gateway::{ResourceCoords, ResourceGateway};
use crate::{Error, Result};

/// Denial returned once the one-time read has been consumed
pub const SECRET_CONSUMED: &str = "secret has already been read and cannot be retrieved again";

/// One-time credential reveal over the resource gateway
pub struct SecretDisclosure {
    gateway: Arc<dyn ResourceGateway>,
}

impl SecretDisclosure {
    /// Create a disclosure manager over the given gateway
    pub fn new(gateway: Arc<dyn ResourceGateway>) -> Self {
        Self { gateway }
    }

    /// Reveal the credential behind an APIKey exactly once
    ///
    /// The caller must already be authorized to read the key. On success the
    /// key's `canReadSecret` flag is flipped to false, and every later call
    /// returns 403 without touching the Secret store.
    pub async fn reveal(&self, namespace: &str, key: &APIKey) -> Result<String> {
        let name = key.name_any();
        let status = key.status.as_ref();

        // Consumed (or never marked readable) keys are refused before any
        // Secret access.
        if status.and_then(|s| s.can_read_secret) != Some(true) {
            debug!(api_key = %name, "Refusing secret read: already consumed");
            return Err(Error::forbidden(SECRET_CONSUMED));
        }

        let secret_ref = status
            .and_then(|s| s.secret_ref.as_ref())
            .ok_or_else(|| Error::not_found("secret reference not found"))?;

        // A failed Secret fetch leaves canReadSecret untouched: the one-time
        // read is only spent on a delivered value.
        let secret = self
            .gateway
            .get_secret(namespace, &secret_ref.name)
            .await
            .map_err(|e| {
                debug!(api_key = %name, secret = %secret_ref.name, error = %e, "Secret fetch failed");
                Error::not_found("secret not found")
            })?;

        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(&secret_ref.key))
            .ok_or_else(|| {
                Error::not_found(format!(
                    "secret value not found under key '{}'",
                    secret_ref.key
                ))
            })?;

        let credential = String::from_utf8(value.0.clone())
            .map_err(|_| Error::not_found("secret value is not valid UTF-8"))?;

        // Flip the flag only now that the value is in hand; the response
        // carries the credential iff this patch ran.
        self.gateway
            .patch_status(
                &ResourceCoords::api_keys(namespace),
                &name,
                &json!({"status": {"canReadSecret": false}}),
            )
            .await?;

        info!(api_key = %name, namespace = %namespace, "Disclosed one-time secret");
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockResourceGateway;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn key(status: Value) -> APIKey {
        serde_json::from_value(json!({
            "apiVersion": "portal.example.dev/v1alpha1",
            "kind": "APIKey",
            "metadata": {"name": "bob-weather-00ff00ff", "namespace": "teamA"},
            "spec": {
                "apiProductRef": {"name": "weather"},
                "planTier": "bronze",
                "requestedBy": {"userId": "user:default/bob"}
            },
            "status": status
        }))
        .unwrap()
    }

    fn secret_with(data_key: &str, value: &[u8]) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(data_key.to_string(), ByteString(value.to_vec()));
        Secret {
            data: Some(data),
            ..Default::default()
        }
    }

    // ==========================================================================
    // Show-Once Stories
    // ==========================================================================

    /// Story: the first read delivers the credential and consumes the flag
    ///
    /// The value is returned and canReadSecret is merge-patched to false in
    /// the same request, after the decode succeeded.
    #[tokio::test]
    async fn story_first_read_delivers_and_consumes() {
        let mut gateway = MockResourceGateway::new();
        gateway
            .expect_get_secret()
            .withf(|ns, name| ns == "teamA" && name == "sec1")
            .returning(|_, _| Ok(secret_with("api_key", b"XYZ")));
        gateway
            .expect_patch_status()
            .withf(|coords, name, patch| {
                coords.plural == "apikeys"
                    && name == "bob-weather-00ff00ff"
                    && *patch == json!({"status": {"canReadSecret": false}})
            })
            .returning(|_, _, _| Ok(json!({})));

        let disclosure = SecretDisclosure::new(Arc::new(gateway));
        let k = key(json!({
            "canReadSecret": true,
            "secretRef": {"name": "sec1", "key": "api_key"}
        }));

        let credential = disclosure.reveal("teamA", &k).await.unwrap();
        assert_eq!(credential, "XYZ");
    }

    /// Story: a consumed key never reaches the Secret store again
    ///
    /// The mock gateway has no expectations; any Secret fetch would fail the
    /// test. Only the 403 comes back.
    #[tokio::test]
    async fn story_second_read_is_refused_without_secret_access() {
        let gateway = MockResourceGateway::new();
        let disclosure = SecretDisclosure::new(Arc::new(gateway));
        let k = key(json!({
            "canReadSecret": false,
            "secretRef": {"name": "sec1", "key": "api_key"}
        }));

        let err = disclosure.reveal("teamA", &k).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(err.to_string(), SECRET_CONSUMED);
    }

    /// Story: a key never marked readable is refused the same way
    #[tokio::test]
    async fn story_unmarked_key_is_refused() {
        let gateway = MockResourceGateway::new();
        let disclosure = SecretDisclosure::new(Arc::new(gateway));

        let err = disclosure.reveal("teamA", &key(json!({}))).await.unwrap_err();
        assert_eq!(err.to_string(), SECRET_CONSUMED);
    }

    /// Story: a readable key without a secret reference is a 404
    #[tokio::test]
    async fn story_missing_secret_ref_is_not_found() {
        let gateway = MockResourceGateway::new();
        let disclosure = SecretDisclosure::new(Arc::new(gateway));
        let k = key(json!({"canReadSecret": true}));

        let err = disclosure.reveal("teamA", &k).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "secret reference not found");
    }

    /// Story: a failed Secret fetch does not burn the one-time read
    ///
    /// The fetch error maps to 404 and no status patch is issued, so the
    /// requester can retry once the Secret exists.
    #[tokio::test]
    async fn story_transient_secret_failure_preserves_the_read() {
        let mut gateway = MockResourceGateway::new();
        gateway
            .expect_get_secret()
            .returning(|_, _| Err(Error::internal("secrets \"sec1\" not found")));
        // No patch_status expectation: flipping the flag here would fail.

        let disclosure = SecretDisclosure::new(Arc::new(gateway));
        let k = key(json!({
            "canReadSecret": true,
            "secretRef": {"name": "sec1", "key": "api_key"}
        }));

        let err = disclosure.reveal("teamA", &k).await.unwrap_err();
        assert_eq!(err.to_string(), "secret not found");
    }

    /// Story: a Secret without the referenced key is a 404, read preserved
    #[tokio::test]
    async fn story_missing_data_key_preserves_the_read() {
        let mut gateway = MockResourceGateway::new();
        gateway
            .expect_get_secret()
            .returning(|_, _| Ok(secret_with("other_key", b"nope")));

        let disclosure = SecretDisclosure::new(Arc::new(gateway));
        let k = key(json!({
            "canReadSecret": true,
            "secretRef": {"name": "sec1", "key": "api_key"}
        }));

        let err = disclosure.reveal("teamA", &k).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("api_key"));
    }
}
