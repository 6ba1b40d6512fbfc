//! Platform webhook: subscription handshake and signed event delivery.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use messenger_automation::ProcessReport;
use messenger_channels::webhook::SIGNATURE_HEADER;
use messenger_channels::WebhookError;
use serde::Deserialize;
use tracing::{info, warn};

use crate::rest::{api_error, ApiError, AppState, ErrorResponse};

#[derive(Debug, Deserialize)]
pub struct SubscriptionQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /webhook — echoes the challenge when the verify token matches.
#[utoipa::path(
    get,
    path = "/webhook",
    tag = "Webhook",
    params(
        ("hub.mode" = String, Query, description = "Always `subscribe`"),
        ("hub.verify_token" = String, Query, description = "Configured verify token"),
        ("hub.challenge" = String, Query, description = "Value to echo back"),
    ),
    responses(
        (status = 200, description = "Subscription confirmed", body = String),
        (status = 403, description = "Token mismatch"),
    )
)]
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<String, StatusCode> {
    let token_ok = !state.verify_token.is_empty()
        && query.verify_token.as_deref() == Some(state.verify_token.as_str());
    match (query.mode.as_deref(), query.challenge) {
        (Some("subscribe"), Some(challenge)) if token_ok => {
            info!("Webhook subscription verified");
            Ok(challenge)
        }
        _ => {
            warn!(mode = ?query.mode, "Webhook subscription refused");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// POST /webhook — signed event delivery from the platform.
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "Webhook",
    request_body(content = String, description = "Raw signed webhook body"),
    responses(
        (status = 200, description = "Delivery processed", body = ProcessReport),
        (status = 400, description = "Malformed payload", body = ErrorResponse),
        (status = 401, description = "Missing or invalid signature", body = ErrorResponse),
    )
)]
pub async fn receive_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProcessReport>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    state
        .pipeline
        .handle_webhook(&body, signature)
        .await
        .map(Json)
        .map_err(|e| {
            let status = match e {
                WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                    StatusCode::UNAUTHORIZED
                }
                WebhookError::Malformed(_) | WebhookError::UnsupportedObject(_) => {
                    StatusCode::BAD_REQUEST
                }
            };
            api_error(status, "webhook_rejected", e.to_string())
        })
}
