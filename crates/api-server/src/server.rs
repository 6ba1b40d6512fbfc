//! API server: REST routes plus a Prometheus exporter on its own port.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use messenger_core::config::ApiConfig;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::broadcast_rest;
use crate::rest::{self, AppState};
use crate::scheduler_rest;
use crate::swagger::ApiDoc;
use crate::webhook_rest;

/// Every route the service exposes, with middleware applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Platform webhook
        .route(
            "/webhook",
            get(webhook_rest::verify_subscription).post(webhook_rest::receive_events),
        )
        // Delayed execution
        .route("/scheduler/wake", post(scheduler_rest::handle_wake))
        .route("/scheduler/sweep", post(scheduler_rest::handle_sweep))
        // Broadcast
        .route("/broadcast/run", post(broadcast_rest::handle_broadcast_run))
        .route("/campaigns", post(broadcast_rest::handle_create_campaign))
        .route("/campaigns/:id", get(broadcast_rest::handle_get_campaign))
        .route(
            "/campaigns/:id/recipients",
            get(broadcast_rest::handle_campaign_recipients),
        )
        .route("/v2/utility/send", post(broadcast_rest::handle_utility_send))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serves the REST routes until the listener fails.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());

        let addr = SocketAddr::new(self.config.host.parse()?, self.config.http_port);
        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Installs the global metrics recorder and its scrape endpoint.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.host.parse()?,
                self.config.metrics_port,
            ))
            .install()?;

        info!(port = self.config.metrics_port, "Metrics exporter started");
        Ok(())
    }
}
