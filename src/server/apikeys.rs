//! APIKey endpoints: single fetch and the one-time secret read
//!
//! The read cascade for keys resolves ownership against the requester
//! recorded on the key. The secret endpoint hands the fetched key to the
//! disclosure manager, which enforces the show-once protocol.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::resolver::require_requester;
use crate::auth::{Tier, Verb, RESOURCE_API_KEY};
use crate::crd::APIKey;
use crate::gateway::ResourceCoords;
use crate::server::{parse_resource, AppState};
use crate::Result;

const VIEW_DENIAL: &str = "You can only view your own API keys.";

/// `GET /apikeys/{namespace}/{name}`
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(&headers).await?;
    let tier = state
        .resolver()
        .resolve_tier(&identity, RESOURCE_API_KEY, Verb::Read)
        .await?;

    let value = state
        .gateway
        .get(&ResourceCoords::api_keys(&namespace), &name)
        .await?;

    if tier == Tier::Own {
        let key: APIKey = parse_resource(value.clone())?;
        require_requester(&identity, &key, VIEW_DENIAL)?;
    }

    Ok(Json(value))
}

/// `GET /apikeys/{namespace}/{name}/secret`
///
/// One-time credential read; see [`crate::disclosure`] for the protocol.
pub async fn secret(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let identity = state.identity.resolve(&headers).await?;
    let tier = state
        .resolver()
        .resolve_tier(&identity, RESOURCE_API_KEY, Verb::Read)
        .await?;

    let value = state
        .gateway
        .get(&ResourceCoords::api_keys(&namespace), &name)
        .await?;
    let key: APIKey = parse_resource(value)?;

    if tier == Tier::Own {
        require_requester(&identity, &key, VIEW_DENIAL)?;
    }

    let credential = state.disclosure().reveal(&namespace, &key).await?;
    Ok(Json(json!({"apiKey": credential})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::fake::FakePermissions;
    use crate::gateway::MockResourceGateway;
    use crate::server::testing::{state, user_headers};
    use crate::Error;
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn key_value(requester: &str, can_read: Option<bool>) -> Value {
        let mut status = json!({
            "secretRef": {"name": "sec1", "key": "api_key"}
        });
        if let Some(flag) = can_read {
            status["canReadSecret"] = json!(flag);
        }
        json!({
            "apiVersion": "portal.example.dev/v1alpha1",
            "kind": "APIKey",
            "metadata": {"name": "bob-weather-00ff00ff", "namespace": "teamA"},
            "spec": {
                "apiProductRef": {"name": "weather"},
                "planTier": "bronze",
                "requestedBy": {"userId": requester}
            },
            "status": status
        })
    }

    fn secret_with(value: &[u8]) -> Secret {
        let mut data = BTreeMap::new();
        data.insert("api_key".to_string(), ByteString(value.to_vec()));
        Secret {
            data: Some(data),
            ..Default::default()
        }
    }

    /// Story: a requester fetches their own key
    #[tokio::test]
    async fn story_requester_reads_own_key() {
        let mut gateway = MockResourceGateway::new();
        gateway
            .expect_get()
            .returning(|_, _| Ok(key_value("user:default/bob", Some(true))));
        let permissions = FakePermissions::allowing(&["apikey.read.own"]);

        let Json(body) = get_one(
            State(state(gateway, permissions)),
            Path(("teamA".into(), "bob-weather-00ff00ff".into())),
            user_headers("user:default/bob"),
        )
        .await
        .unwrap();
        assert_eq!(body["metadata"]["name"], "bob-weather-00ff00ff");
    }

    /// Story: someone else's key is invisible to an "-own" reader
    #[tokio::test]
    async fn story_non_requester_cannot_read_key() {
        let mut gateway = MockResourceGateway::new();
        gateway
            .expect_get()
            .returning(|_, _| Ok(key_value("user:default/bob", Some(true))));
        let permissions = FakePermissions::allowing(&["apikey.read.own"]);

        let err = get_one(
            State(state(gateway, permissions)),
            Path(("teamA".into(), "bob-weather-00ff00ff".into())),
            user_headers("user:default/alice"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), VIEW_DENIAL);
    }

    /// Story: the secret endpoint delivers once, then refuses
    ///
    /// First call returns the decoded credential and flips the flag; a
    /// second call against the consumed key is refused with 403.
    #[tokio::test]
    async fn story_secret_read_is_show_once() {
        let mut gateway = MockResourceGateway::new();
        gateway
            .expect_get()
            .returning(|_, _| Ok(key_value("user:default/bob", Some(true))));
        gateway
            .expect_get_secret()
            .returning(|_, _| Ok(secret_with(b"XYZ")));
        gateway
            .expect_patch_status()
            .withf(|_, _, patch| *patch == json!({"status": {"canReadSecret": false}}))
            .times(1)
            .returning(|_, _, patch| Ok(patch.clone()));
        let permissions = FakePermissions::allowing(&["apikey.read.own"]);

        let Json(body) = secret(
            State(state(gateway, permissions)),
            Path(("teamA".into(), "bob-weather-00ff00ff".into())),
            user_headers("user:default/bob"),
        )
        .await
        .unwrap();
        assert_eq!(body, json!({"apiKey": "XYZ"}));

        // Second call: the stored key now carries canReadSecret=false and
        // the Secret store must not be touched.
        let mut gateway = MockResourceGateway::new();
        gateway
            .expect_get()
            .returning(|_, _| Ok(key_value("user:default/bob", Some(false))));
        let permissions = FakePermissions::allowing(&["apikey.read.own"]);

        let err = secret(
            State(state(gateway, permissions)),
            Path(("teamA".into(), "bob-weather-00ff00ff".into())),
            user_headers("user:default/bob"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(
            err.to_string(),
            "secret has already been read and cannot be retrieved again"
        );
    }
}
