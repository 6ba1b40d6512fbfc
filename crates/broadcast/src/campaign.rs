//! Campaign creation and validation.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use messenger_core::campaign::{
    AudienceType, Campaign, CampaignCounters, CampaignStatus, PolicyMode, Recipient, SendMode,
};
use messenger_core::clock::Clock;
use messenger_core::error::{MessengerError, MessengerResult};
use messenger_core::rule::{validate_action, Action, ActionKind};
use messenger_core::store::Repositories;
use messenger_core::types::MessageTag;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

/// Body accepted by campaign creation. `pageId` and `pageIds` are both
/// accepted so that multi-page requests can be refused explicitly.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub page_ids: Option<Vec<String>>,
    pub audience_type: AudienceType,
    pub send_mode: SendMode,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub policy_mode: PolicyMode,
    #[serde(default)]
    pub tag: Option<String>,
    /// `TEXT`, `CARD`, `AUDIO` or `IMAGE`.
    pub message_type: String,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

impl CreateCampaignRequest {
    fn single_page(&self) -> MessengerResult<String> {
        let mut pages: Vec<&str> = self
            .page_ids
            .iter()
            .flatten()
            .chain(self.page_id.iter())
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        pages.sort_unstable();
        pages.dedup();
        match pages.as_slice() {
            [page] => Ok(page.to_string()),
            [] => Err(MessengerError::Validation("a target page is required".into())),
            _ => Err(MessengerError::Validation(
                "a campaign must target exactly one page".into(),
            )),
        }
    }

    fn message(&self) -> MessengerResult<ActionKind> {
        let mut body = match &self.payload {
            serde_json::Value::Object(map) => map.clone(),
            _ => {
                return Err(MessengerError::Validation(
                    "payload must be a JSON object".into(),
                ))
            }
        };
        body.insert(
            "type".into(),
            serde_json::Value::String(self.message_type.trim().to_ascii_uppercase()),
        );
        let kind: ActionKind = serde_json::from_value(serde_json::Value::Object(body))
            .map_err(|e| MessengerError::Validation(format!("invalid message payload: {e}")))?;
        validate_action(&Action {
            delay_ms: 0,
            kind: kind.clone(),
        })
        .map_err(MessengerError::Validation)?;
        Ok(kind)
    }
}

pub struct CampaignService {
    repos: Repositories,
    clock: Arc<dyn Clock>,
}

impl CampaignService {
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>) -> Self {
        Self { repos, clock }
    }

    /// Validates and stores a new campaign. Immediate campaigns are due at
    /// once; scheduled ones wait for `scheduledAt`.
    pub async fn create(&self, req: CreateCampaignRequest) -> MessengerResult<Campaign> {
        if req.name.trim().is_empty() {
            return Err(MessengerError::Validation("campaign name must not be empty".into()));
        }
        let page_id = req.single_page()?;
        let page = self
            .repos
            .pages
            .get_page(&page_id)
            .await?
            .ok_or_else(|| MessengerError::not_found("page", &page_id))?;
        if !page.active {
            return Err(MessengerError::Validation(format!("page {page_id} is not active")));
        }

        let tag = req
            .tag
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(MessageTag::from_str)
            .transpose()
            .map_err(MessengerError::Validation)?;
        let message = req.message()?;

        let now = self.clock.now();
        let scheduled_at = match req.send_mode {
            SendMode::Immediate => now,
            SendMode::Scheduled => req.scheduled_at.ok_or_else(|| {
                MessengerError::Validation("scheduledAt is required for scheduled campaigns".into())
            })?,
        };

        let campaign = Campaign {
            id: Uuid::new_v4(),
            page_id,
            name: req.name.trim().to_string(),
            status: CampaignStatus::Scheduled,
            audience: req.audience_type,
            send_mode: req.send_mode,
            scheduled_at: Some(scheduled_at),
            policy_mode: req.policy_mode,
            tag,
            message,
            counters: CampaignCounters::default(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };
        self.repos.campaigns.insert_campaign(campaign.clone()).await?;

        info!(
            campaign_id = %campaign.id,
            page_id = %campaign.page_id,
            audience = ?campaign.audience,
            policy = ?campaign.policy_mode,
            scheduled_at = %scheduled_at,
            "Campaign created"
        );
        metrics::counter!("broadcast.campaign.created").increment(1);
        Ok(campaign)
    }

    pub async fn get(&self, id: Uuid) -> MessengerResult<Campaign> {
        self.repos
            .campaigns
            .get_campaign(id)
            .await?
            .ok_or_else(|| MessengerError::not_found("campaign", id))
    }

    /// Per-recipient delivery rows of an existing campaign.
    pub async fn recipients(&self, id: Uuid) -> MessengerResult<Vec<Recipient>> {
        let campaign = self.get(id).await?;
        self.repos.campaigns.list_recipients(campaign.id).await
    }
}
