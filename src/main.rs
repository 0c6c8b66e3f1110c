//! API Portal backend - Kubernetes-backed API product management

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use apiportal::auth::identity::{DEFAULT_GROUPS_HEADER, DEFAULT_USER_HEADER};
use apiportal::auth::{HeaderIdentityResolver, HttpPermissionClient};
use apiportal::catalog::{spawn_periodic_sync, CatalogSyncProvider};
use apiportal::crd::{APIKey, APIProduct};
use apiportal::gateway::KubeGateway;
use apiportal::server::{router, AppState};
use apiportal::{DEFAULT_BIND_ADDR, DEFAULT_SYNC_INTERVAL_SECS};

/// API Portal backend - publishes APIProducts and brokers APIKey access
#[derive(Parser, Debug)]
#[command(name = "apiportal", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Address to bind the HTTP server to
    #[arg(long, env = "APIPORTAL_BIND", default_value = DEFAULT_BIND_ADDR)]
    bind: String,

    /// Endpoint of the portal's permission-decision service
    #[arg(long, env = "APIPORTAL_PERMISSION_ENDPOINT")]
    permission_endpoint: Option<String>,

    /// Endpoint of the portal catalog to push published products to
    #[arg(long, env = "APIPORTAL_CATALOG_ENDPOINT")]
    catalog_endpoint: Option<String>,

    /// Seconds between catalog sync passes
    #[arg(
        long,
        env = "APIPORTAL_SYNC_INTERVAL_SECS",
        default_value_t = DEFAULT_SYNC_INTERVAL_SECS
    )]
    sync_interval_secs: u64,

    /// Trusted header carrying the caller's user identifier
    #[arg(long, env = "APIPORTAL_USER_HEADER", default_value = DEFAULT_USER_HEADER)]
    user_header: String,

    /// Trusted header carrying the caller's group identifiers
    #[arg(long, env = "APIPORTAL_GROUPS_HEADER", default_value = DEFAULT_GROUPS_HEADER)]
    groups_header: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        // Generate CRD YAML for both resource kinds
        let product_crd = serde_yaml::to_string(&APIProduct::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize APIProduct CRD: {}", e))?;
        let key_crd = serde_yaml::to_string(&APIKey::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize APIKey CRD: {}", e))?;
        println!("{product_crd}---\n{key_crd}");
        return Ok(());
    }

    let permission_endpoint = cli
        .permission_endpoint
        .ok_or_else(|| anyhow::anyhow!("--permission-endpoint is required to serve"))?;

    let client = Client::try_default().await?;
    let gateway = Arc::new(KubeGateway::new(client));

    let catalog = Arc::new(CatalogSyncProvider::new(
        gateway.clone(),
        cli.catalog_endpoint,
    ));
    let sync_task = spawn_periodic_sync(
        catalog.clone(),
        Duration::from_secs(cli.sync_interval_secs),
    );

    let state = Arc::new(AppState::new(
        gateway,
        Arc::new(HttpPermissionClient::new(permission_endpoint)),
        Arc::new(HeaderIdentityResolver::new(
            cli.user_header,
            cli.groups_header,
        )),
        catalog,
    ));

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    tracing::info!(addr = %cli.bind, "API portal backend listening");
    axum::serve(listener, router(state)).await?;

    sync_task.abort();
    Ok(())
}
