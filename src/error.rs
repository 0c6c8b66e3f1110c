//! Error types for the API portal backend
//!
//! One error enum covers the whole request pipeline. Each variant maps to
//! exactly one HTTP status at the axum boundary, so handlers convert an error
//! to a response exactly once, at the top level. Bulk paths catch per item
//! and record the display string instead of letting the error bubble.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Main error type for portal operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error, surfaced with the upstream message
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Malformed or missing request input, or a referenced resource that
    /// could not be resolved on the caller's behalf
    #[error("{0}")]
    Input(String),

    /// No verifiable credentials on the request
    #[error("{0}")]
    Authentication(String),

    /// Permission cascade denied the action
    #[error("{0}")]
    Forbidden(String),

    /// Resource absent from the store
    #[error("{0}")]
    NotFound(String),

    /// Upstream collaborator failure (permission service, catalog push)
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an input error with the given message
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Create an authentication error with the given message
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an authorization error with the given message
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an upstream error with the given message
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Input(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Kube(_) | Self::Upstream(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: input errors tell the caller what to fix
    ///
    /// Missing request fields and unresolvable references are the caller's
    /// to correct, so they surface as 400 with the exact reason.
    #[test]
    fn story_input_errors_map_to_bad_request() {
        let err = Error::input("apiProductName, namespace and planTier are required");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("planTier"));
    }

    /// Story: the error taxonomy maps each category to one status
    #[test]
    fn story_error_categories_map_to_http_statuses() {
        assert_eq!(
            Error::authentication("authentication required").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::forbidden("unauthorised").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::not_found("secret not found").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::upstream("permission service unreachable").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::internal("oops").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    /// Story: denial reasons pass through verbatim
    ///
    /// Authorization denials carry a human-readable reason with no prefix,
    /// so bulk results and single responses show the same sentence.
    #[test]
    fn story_forbidden_messages_are_verbatim() {
        let err = Error::forbidden("You can only approve requests for your own API products.");
        assert_eq!(
            err.to_string(),
            "You can only approve requests for your own API products."
        );
    }

    /// Story: error responses use the uniform body shape
    #[test]
    fn story_response_body_is_error_envelope() {
        let response = Error::not_found("secret not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
