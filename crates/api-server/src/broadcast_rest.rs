//! Campaigns, the broadcast trigger and the utility send path.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use messenger_broadcast::{
    BroadcastReport, CreateCampaignRequest, UtilitySendError, UtilitySendReceipt,
    UtilitySendRequest,
};
use messenger_core::campaign::{Campaign, Recipient};
use tracing::warn;
use uuid::Uuid;

use crate::rest::{api_error, messenger_error, ApiError, AppState, ErrorResponse};

/// POST /broadcast/run — one pass over due campaigns.
#[utoipa::path(
    post,
    path = "/broadcast/run",
    tag = "Broadcast",
    responses(
        (status = 200, description = "Pass finished", body = BroadcastReport),
        (status = 500, description = "Store failure", body = ErrorResponse),
    )
)]
pub async fn handle_broadcast_run(
    State(state): State<AppState>,
) -> Result<Json<BroadcastReport>, ApiError> {
    state
        .broadcasts
        .process_due()
        .await
        .map(Json)
        .map_err(messenger_error)
}

/// POST /campaigns
#[utoipa::path(
    post,
    path = "/campaigns",
    tag = "Broadcast",
    request_body = CreateCampaignRequest,
    responses(
        (status = 201, description = "Campaign scheduled", body = Campaign),
        (status = 400, description = "Invalid campaign", body = ErrorResponse),
        (status = 404, description = "Unknown page", body = ErrorResponse),
    )
)]
pub async fn handle_create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    let campaign = state
        .campaigns
        .create(request)
        .await
        .map_err(messenger_error)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /campaigns/{id}
#[utoipa::path(
    get,
    path = "/campaigns/{id}",
    tag = "Broadcast",
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Campaign with aggregate counters", body = Campaign),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
    )
)]
pub async fn handle_get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    state.campaigns.get(id).await.map(Json).map_err(messenger_error)
}

/// GET /campaigns/{id}/recipients
#[utoipa::path(
    get,
    path = "/campaigns/{id}/recipients",
    tag = "Broadcast",
    params(("id" = Uuid, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Recipient rows", body = [Recipient]),
        (status = 404, description = "Unknown campaign", body = ErrorResponse),
    )
)]
pub async fn handle_campaign_recipients(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Recipient>>, ApiError> {
    state
        .campaigns
        .recipients(id)
        .await
        .map(Json)
        .map_err(messenger_error)
}

/// POST /v2/utility/send — template-gated single send. Policy refusals
/// come back as 422 with the compliance code in `error`.
#[utoipa::path(
    post,
    path = "/v2/utility/send",
    tag = "Broadcast",
    request_body = UtilitySendRequest,
    responses(
        (status = 200, description = "Message sent", body = UtilitySendReceipt),
        (status = 400, description = "Nothing to send", body = ErrorResponse),
        (status = 404, description = "Unknown page", body = ErrorResponse),
        (status = 422, description = "Refused by compliance", body = ErrorResponse),
        (status = 502, description = "Platform send failed", body = ErrorResponse),
    )
)]
pub async fn handle_utility_send(
    State(state): State<AppState>,
    Json(request): Json<UtilitySendRequest>,
) -> Result<Json<UtilitySendReceipt>, ApiError> {
    match state.utility.send(request).await {
        Ok(receipt) => Ok(Json(receipt)),
        Err(UtilitySendError::Compliance(e)) => {
            metrics::counter!("api.compliance_rejections", "code" => e.code.as_str()).increment(1);
            Err(api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                e.code.as_str(),
                e.message,
            ))
        }
        Err(UtilitySendError::Invalid(msg)) => {
            Err(api_error(StatusCode::BAD_REQUEST, "invalid_request", msg))
        }
        Err(UtilitySendError::Store(e)) => Err(messenger_error(e)),
        Err(UtilitySendError::Send(msg)) => {
            warn!(error = %msg, "Utility send failed");
            Err(api_error(StatusCode::BAD_GATEWAY, "send_failed", msg))
        }
    }
}
