//! API server — assembles the router and the metrics exporter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use atlas_core::AppConfig;
use atlas_providers::AdapterFactory;
use atlas_store::AtlasStore;
use atlas_sync::SyncOrchestrator;
use atlas_webhooks::WebhookProcessor;

use crate::rest::{self, AppState};
use crate::webhook_rest;

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        store: Arc<AtlasStore>,
        orchestrator: Arc<SyncOrchestrator>,
        processor: Arc<WebhookProcessor>,
        adapters: Arc<dyn AdapterFactory>,
    ) -> Self {
        let state = AppState {
            store,
            orchestrator,
            processor,
            adapters,
            config: config.clone(),
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        };
        Self { config, state }
    }

    /// Build the HTTP router with all function and operational routes.
    pub fn router(&self) -> Router {
        let function_routes = Router::new()
            .route("/functions/email-sync", post(rest::handle_email_sync))
            .route("/functions/contact-search", post(rest::handle_contact_search))
            .route(
                "/functions/sendline-webhook",
                post(webhook_rest::sendline_webhook),
            )
            .route(
                "/functions/outflow-webhook",
                post(webhook_rest::outflow_webhook),
            )
            .with_state(self.state.clone());

        let ops_routes = Router::new()
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            .with_state(self.state.clone());

        Router::new()
            .merge(function_routes)
            .merge(ops_routes)
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Start the Prometheus exporter on a separate port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
