//! OpenAPI specification served next to the REST routes.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Messenger Automation API",
        version = "0.1.0",
        description = "Keyword automations, conversational flows, delayed sequences and policy-aware broadcasts for Messenger pages.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Webhook", description = "Platform subscription handshake and event delivery"),
        (name = "Scheduler", description = "Delayed execution wake and sweep triggers"),
        (name = "Broadcast", description = "Campaigns, broadcast passes and utility sends"),
        (name = "Operations", description = "Health, readiness and liveness checks"),
    ),
    paths(
        // Webhook
        crate::webhook_rest::verify_subscription,
        crate::webhook_rest::receive_events,
        // Scheduler
        crate::scheduler_rest::handle_wake,
        crate::scheduler_rest::handle_sweep,
        // Broadcast
        crate::broadcast_rest::handle_broadcast_run,
        crate::broadcast_rest::handle_create_campaign,
        crate::broadcast_rest::handle_get_campaign,
        crate::broadcast_rest::handle_campaign_recipients,
        crate::broadcast_rest::handle_utility_send,
        // Operations
        crate::rest::health_check,
        crate::rest::readiness,
        crate::rest::liveness,
    ),
    components(schemas(
        crate::rest::ErrorResponse,
        crate::rest::HealthResponse,
        crate::scheduler_rest::WakeRequest,
        crate::scheduler_rest::WakeResponse,
        messenger_automation::ProcessReport,
        messenger_scheduler::SweepReport,
        messenger_scheduler::SweepOutcome,
        messenger_broadcast::BroadcastReport,
        messenger_broadcast::CampaignProgress,
        messenger_broadcast::CreateCampaignRequest,
        messenger_broadcast::UtilitySendRequest,
        messenger_broadcast::UtilitySendReceipt,
        messenger_core::campaign::Campaign,
        messenger_core::campaign::CampaignStatus,
        messenger_core::campaign::CampaignCounters,
        messenger_core::campaign::AudienceType,
        messenger_core::campaign::SendMode,
        messenger_core::campaign::PolicyMode,
        messenger_core::campaign::Recipient,
        messenger_core::campaign::RecipientStatus,
        messenger_core::types::MessageTag,
    ))
)]
pub struct ApiDoc;
