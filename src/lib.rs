//! API Portal - developer-portal backend for Kubernetes-backed API products
//!
//! API owners publish APIs as APIProduct custom resources; consumers request
//! tiered API keys (APIKey custom resources) which owners approve or reject.
//! Every mutating operation passes through a two-tier permission cascade
//! (global "-all" permissions vs ownership-scoped "-own" permissions), and
//! approved key credentials are disclosed through a show-once read protocol.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (APIProduct, APIKey)
//! - [`gateway`] - Thin typed wrapper over the Kubernetes API
//! - [`auth`] - Identity resolution, permission decisions, authorization cascade
//! - [`server`] - HTTP surface (axum handlers for products, requests, keys)
//! - [`disclosure`] - Show-once secret disclosure state machine
//! - [`catalog`] - Published-product sync into the portal catalog
//! - [`error`] - Error types and HTTP status mapping

#![deny(missing_docs)]

pub mod auth;
pub mod catalog;
pub mod crd;
pub mod disclosure;
pub mod error;
pub mod gateway;
pub mod server;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Default bind address for the HTTP server
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:7007";

/// Default interval between catalog sync passes, in seconds
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;
