//! Scheduler wake and sweep triggers.

use axum::extract::State;
use axum::Json;
use messenger_scheduler::SweepReport;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::rest::{messenger_error, ApiError, AppState, ErrorResponse};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WakeRequest {
    pub execution_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WakeResponse {
    pub execution_id: Uuid,
    /// `paused`, `done`, `too_early`, `not_found`, `already_claimed` or `aborted`.
    pub outcome: String,
}

/// POST /scheduler/wake — resume one checkpoint. Waking a finished or
/// unknown execution answers `not_found` with 200.
#[utoipa::path(
    post,
    path = "/scheduler/wake",
    tag = "Scheduler",
    request_body = WakeRequest,
    responses(
        (status = 200, description = "Wake handled", body = WakeResponse),
        (status = 500, description = "Store failure", body = ErrorResponse),
    )
)]
pub async fn handle_wake(
    State(state): State<AppState>,
    Json(request): Json<WakeRequest>,
) -> Result<Json<WakeResponse>, ApiError> {
    let outcome = state
        .scheduler
        .resume(request.execution_id)
        .await
        .map_err(messenger_error)?;
    debug!(execution_id = %request.execution_id, outcome = outcome.label(), "Wake handled");
    Ok(Json(WakeResponse {
        execution_id: request.execution_id,
        outcome: outcome.label().to_string(),
    }))
}

/// POST /scheduler/sweep — resume everything whose wake time has passed.
#[utoipa::path(
    post,
    path = "/scheduler/sweep",
    tag = "Scheduler",
    responses(
        (status = 200, description = "Sweep finished", body = SweepReport),
        (status = 500, description = "Store failure", body = ErrorResponse),
    )
)]
pub async fn handle_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
    state
        .scheduler
        .sweep()
        .await
        .map(Json)
        .map_err(messenger_error)
}
