//! Single-recipient, template-gated sends. Every request goes through the
//! compliance guard first; a refusal comes back as a structured error and
//! is never retried in another send mode.

use std::sync::Arc;

use messenger_channels::{MessagingType, RecipientDescriptor};
use messenger_core::clock::Clock;
use messenger_core::error::MessengerError;
use messenger_core::rule::ActionKind;
use messenger_core::store::Repositories;
use messenger_core::types::MessageTag;
use messenger_policy::{Clearance, ComplianceError, ComplianceGuard, TemplateCategory};
use messenger_scheduler::{ActionDispatcher, DispatchContext, DispatchResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UtilitySendRequest {
    pub page_id: String,
    pub user_id: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default = "default_category")]
    #[schema(value_type = String, example = "UTILITY")]
    pub category: TemplateCategory,
    /// Free text, only sendable while the user's window is open.
    #[serde(default)]
    pub text: Option<String>,
}

fn default_category() -> TemplateCategory {
    TemplateCategory::Utility
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UtilitySendReceipt {
    pub message_id: Option<String>,
    #[schema(value_type = String)]
    pub messaging_type: &'static str,
    pub tag: Option<MessageTag>,
    pub template_id: Option<String>,
}

#[derive(Error, Debug)]
pub enum UtilitySendError {
    #[error(transparent)]
    Compliance(#[from] ComplianceError),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] MessengerError),

    #[error("send failed: {0}")]
    Send(String),
}

pub struct UtilitySender {
    repos: Repositories,
    guard: Arc<ComplianceGuard>,
    dispatcher: Arc<ActionDispatcher>,
    clock: Arc<dyn Clock>,
}

impl UtilitySender {
    pub fn new(
        repos: Repositories,
        guard: Arc<ComplianceGuard>,
        dispatcher: Arc<ActionDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repos,
            guard,
            dispatcher,
            clock,
        }
    }

    pub fn guard(&self) -> &ComplianceGuard {
        &self.guard
    }

    pub async fn send(&self, req: UtilitySendRequest) -> Result<UtilitySendReceipt, UtilitySendError> {
        let page = self
            .repos
            .pages
            .get_page(&req.page_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| MessengerError::not_found("page", &req.page_id))?;
        let last_seen = self
            .repos
            .contacts
            .get_contact(&page.id, &req.user_id)
            .await?
            .and_then(|c| c.last_interaction_at);

        let clearance = self.guard.check(
            last_seen,
            req.category,
            req.template_id.as_deref(),
            req.text.as_deref(),
            self.clock.now(),
        )?;

        let (message, messaging_type, tag) = match clearance {
            Clearance::Tagged { template, tag } => {
                (template.message, MessagingType::MessageTag(tag), Some(tag))
            }
            Clearance::WithinWindow { template } => {
                let message = match (template, req.text.as_deref().map(str::trim)) {
                    (_, Some(text)) if !text.is_empty() => ActionKind::Text {
                        text: text.to_string(),
                        buttons: vec![],
                    },
                    (Some(template), _) => template.message,
                    _ => {
                        return Err(UtilitySendError::Invalid(
                            "either templateId or text is required".into(),
                        ))
                    }
                };
                (message, MessagingType::Response, None)
            }
        };

        let ctx = DispatchContext {
            user_id: req.user_id.clone(),
            ..Default::default()
        };
        let target = RecipientDescriptor::DirectUser(req.user_id.clone());
        match self
            .dispatcher
            .dispatch(&page, &ctx, &target, &message, messaging_type)
            .await
        {
            DispatchResult::Sent { message_id } => {
                info!(
                    page_id = %page.id,
                    user_id = %req.user_id,
                    messaging_type = messaging_type.as_str(),
                    template_id = ?req.template_id,
                    "Utility message sent"
                );
                Ok(UtilitySendReceipt {
                    message_id,
                    messaging_type: messaging_type.as_str(),
                    tag,
                    template_id: req.template_id,
                })
            }
            DispatchResult::Failed { error } => Err(UtilitySendError::Send(error)),
        }
    }
}
