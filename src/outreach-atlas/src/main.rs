//! Outreach Atlas — multi-tenant ingestion and normalization backplane for
//! outbound email campaigns.
//!
//! Main entry point that wires the store, provider adapters, sync
//! orchestrator, and webhook intake behind the HTTP surface.

use std::sync::Arc;

use atlas_api::ApiServer;
use atlas_core::AppConfig;
use atlas_providers::{LiveAdapterFactory, ProviderClient};
use atlas_store::AtlasStore;
use atlas_sync::SyncOrchestrator;
use atlas_webhooks::WebhookProcessor;
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "outreach-atlas")]
#[command(about = "Multi-tenant ingestion backplane for outbound email campaigns")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "OUTREACH_ATLAS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "OUTREACH_ATLAS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Base URL self-continuations are posted to (overrides config)
    #[arg(long, env = "OUTREACH_ATLAS__API__SELF_URL")]
    self_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outreach_atlas=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Outreach Atlas starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(self_url) = cli.self_url {
        config.api.self_url = self_url;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        self_url = %config.api.self_url,
        "Configuration loaded"
    );

    // Wire the core components
    let store = Arc::new(AtlasStore::new());
    let client = Arc::new(ProviderClient::new()?);
    let adapters = Arc::new(LiveAdapterFactory::new(client, &config.providers));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        store.clone(),
        adapters.clone(),
        config.clone(),
    ));
    let processor = Arc::new(WebhookProcessor::new(
        store.clone(),
        config.webhooks.clone(),
    ));

    let api_server = ApiServer::new(
        config.clone(),
        store,
        orchestrator,
        processor,
        adapters,
    );

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Outreach Atlas is ready to serve traffic");

    // Graceful shutdown: listen for SIGTERM/SIGINT
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT, shutting down");
        }
    };

    let addr = std::net::SocketAddr::new(config.api.host.parse()?, config.api.http_port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting HTTP server");
    axum::serve(listener, api_server.router())
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Outreach Atlas shut down cleanly");
    Ok(())
}
