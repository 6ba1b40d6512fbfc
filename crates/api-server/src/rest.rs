//! Shared handler state, error bodies and operational endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use messenger_automation::InboundPipeline;
use messenger_broadcast::{BroadcastRunner, CampaignService, UtilitySender};
use messenger_core::error::MessengerError;
use messenger_scheduler::ExecutionScheduler;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InboundPipeline>,
    pub scheduler: Arc<ExecutionScheduler>,
    pub broadcasts: Arc<BroadcastRunner>,
    pub campaigns: Arc<CampaignService>,
    pub utility: Arc<UtilitySender>,
    /// Token the platform echoes during the webhook subscription handshake.
    pub verify_token: String,
    pub node_id: String,
    pub start_time: Instant,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// Maps domain errors onto HTTP statuses. Store and internal failures are
/// logged here and reported without detail.
pub(crate) fn messenger_error(e: MessengerError) -> ApiError {
    match e {
        MessengerError::Validation(msg) => {
            metrics::counter!("api.validation_errors").increment(1);
            api_error(StatusCode::BAD_REQUEST, "validation_failed", msg)
        }
        e @ MessengerError::NotFound { .. } => {
            api_error(StatusCode::NOT_FOUND, "not_found", e.to_string())
        }
        e => {
            error!(error = %e, "Request failed");
            metrics::counter!("api.errors").increment(1);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal processing error",
            )
        }
    }
}

/// GET /health — Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness check for Kubernetes.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses(
        (status = 200, description = "Ready to accept traffic"),
        (status = 503, description = "Still starting"),
    )
)]
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — Liveness check for Kubernetes.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
