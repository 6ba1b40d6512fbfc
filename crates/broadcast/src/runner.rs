//! Broadcast runner: one bounded batch per due campaign per pass.
//!
//! First pass over a scheduled campaign materializes its recipient rows.
//! Every pass then sends to a batch of pending recipients, re-classifying
//! each one against its own 24h window, and refreshes the campaign's
//! aggregates from the recipient rows.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use messenger_channels::{MessagingType, RecipientDescriptor};
use messenger_core::campaign::{
    Campaign, CampaignCounters, CampaignStatus, Recipient, RecipientOutcome, RecipientStatus,
};
use messenger_core::clock::Clock;
use messenger_core::config::BroadcastConfig;
use messenger_core::error::MessengerResult;
use messenger_core::store::Repositories;
use messenger_core::types::{MessageTag, Page};
use messenger_policy::{classify, PolicyCategory};
use messenger_scheduler::{ActionDispatcher, DispatchContext, DispatchResult};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audience::in_audience;

pub const BLOCKED_BY_POLICY: &str = "blocked by policy";

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignProgress {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
    pub counters: CampaignCounters,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReport {
    /// Campaigns touched in this pass.
    pub processed_count: usize,
    pub campaigns: Vec<CampaignProgress>,
}

pub struct BroadcastRunner {
    repos: Repositories,
    dispatcher: Arc<ActionDispatcher>,
    clock: Arc<dyn Clock>,
    config: BroadcastConfig,
    default_tag: MessageTag,
}

impl BroadcastRunner {
    pub fn new(
        repos: Repositories,
        dispatcher: Arc<ActionDispatcher>,
        clock: Arc<dyn Clock>,
        config: BroadcastConfig,
    ) -> Self {
        let default_tag = MessageTag::from_str(&config.default_tag).unwrap_or_else(|e| {
            warn!(error = %e, "Invalid default broadcast tag, using ACCOUNT_UPDATE");
            MessageTag::AccountUpdate
        });
        Self {
            repos,
            dispatcher,
            clock,
            config,
            default_tag,
        }
    }

    /// Processes one batch for each due campaign. A failing campaign is
    /// logged and left for the next pass.
    pub async fn process_due(&self) -> MessengerResult<BroadcastReport> {
        let now = self.clock.now();
        let campaigns = self
            .repos
            .campaigns
            .due_campaigns(now, self.config.campaign_batch_size)
            .await?;

        let mut report = BroadcastReport::default();
        for campaign in campaigns {
            let id = campaign.id;
            match self.process_campaign(campaign).await {
                Ok(progress) => {
                    report.processed_count += 1;
                    report.campaigns.push(progress);
                }
                Err(e) => error!(campaign_id = %id, error = %e, "Broadcast batch failed"),
            }
        }
        if report.processed_count > 0 {
            debug!(processed = report.processed_count, "Broadcast pass finished");
        }
        Ok(report)
    }

    async fn process_campaign(&self, mut campaign: Campaign) -> MessengerResult<CampaignProgress> {
        let now = self.clock.now();
        let page = match self.repos.pages.get_page(&campaign.page_id).await? {
            Some(page) if page.active => page,
            _ => {
                warn!(campaign_id = %campaign.id, page_id = %campaign.page_id, "Campaign page unavailable");
                campaign.status = CampaignStatus::Failed;
                campaign.failure_reason = Some("page unavailable".into());
                campaign.updated_at = now;
                campaign.completed_at = Some(now);
                self.repos.campaigns.update_campaign(&campaign).await?;
                metrics::counter!("broadcast.campaign", "status" => "failed").increment(1);
                return Ok(progress(&campaign));
            }
        };

        if campaign.status == CampaignStatus::Scheduled {
            self.materialize(&mut campaign, now).await?;
        }

        let batch = self
            .repos
            .campaigns
            .pending_recipients(campaign.id, self.config.recipient_batch_size)
            .await?;
        for recipient in &batch {
            if let Err(e) = self.deliver(&campaign, &page, recipient).await {
                error!(
                    campaign_id = %campaign.id,
                    user_id = %recipient.user_id,
                    error = %e,
                    "Recipient left pending"
                );
            }
        }

        campaign.counters = self.repos.campaigns.recipient_counts(campaign.id).await?;
        campaign.updated_at = self.clock.now();
        if campaign.counters.pending == 0 {
            campaign.status = CampaignStatus::Completed;
            campaign.completed_at = Some(campaign.updated_at);
            info!(
                campaign_id = %campaign.id,
                sent = campaign.counters.sent,
                failed = campaign.counters.failed,
                skipped = campaign.counters.skipped,
                "Campaign completed"
            );
            metrics::counter!("broadcast.campaign", "status" => "completed").increment(1);
        }
        self.repos.campaigns.update_campaign(&campaign).await?;
        Ok(progress(&campaign))
    }

    /// Inserts a pending row per audience member. Rows that already exist
    /// are left untouched, so a retried pass cannot duplicate recipients.
    async fn materialize(&self, campaign: &mut Campaign, now: DateTime<Utc>) -> MessengerResult<()> {
        let contacts = self.repos.contacts.list_contacts(&campaign.page_id).await?;
        let rows: Vec<Recipient> = contacts
            .iter()
            .filter(|c| in_audience(c, campaign.audience, now))
            .map(|c| Recipient::pending(campaign.id, &campaign.page_id, &c.user_id, now))
            .collect();
        let inserted = self.repos.campaigns.insert_recipients(rows).await?;

        campaign.status = CampaignStatus::Sending;
        campaign.started_at = Some(now);
        campaign.updated_at = now;
        campaign.counters = self.repos.campaigns.recipient_counts(campaign.id).await?;
        self.repos.campaigns.update_campaign(campaign).await?;
        info!(
            campaign_id = %campaign.id,
            audience = ?campaign.audience,
            inserted,
            recipients = campaign.counters.recipients,
            "Campaign audience materialized"
        );
        Ok(())
    }

    async fn deliver(
        &self,
        campaign: &Campaign,
        page: &Page,
        recipient: &Recipient,
    ) -> MessengerResult<()> {
        let now = self.clock.now();
        let last_seen = self
            .repos
            .contacts
            .get_contact(&page.id, &recipient.user_id)
            .await?
            .and_then(|c| c.last_interaction_at);
        let category = classify(last_seen, campaign.policy_mode.allows_tagged_sends(), None, now);

        let ctx = DispatchContext {
            user_id: recipient.user_id.clone(),
            campaign_id: Some(campaign.id),
            ..Default::default()
        };
        let messaging_type = match category {
            PolicyCategory::WithinWindow => MessagingType::Response,
            PolicyCategory::UtilityTemplate => {
                MessagingType::MessageTag(campaign.tag.unwrap_or(self.default_tag))
            }
            PolicyCategory::FollowUpTemplate
            | PolicyCategory::ReminderTemplate
            | PolicyCategory::Blocked => {
                self.dispatcher
                    .skip(page, &ctx, &campaign.message, BLOCKED_BY_POLICY)
                    .await;
                let reason = Some(BLOCKED_BY_POLICY.to_string());
                return self
                    .complete(campaign, recipient, RecipientStatus::Skipped, reason, None)
                    .await;
            }
        };

        let target = RecipientDescriptor::DirectUser(recipient.user_id.clone());
        match self
            .dispatcher
            .dispatch(page, &ctx, &target, &campaign.message, messaging_type)
            .await
        {
            DispatchResult::Sent { message_id } => {
                self.complete(campaign, recipient, RecipientStatus::Sent, None, message_id)
                    .await
            }
            DispatchResult::Failed { error } => {
                self.complete(campaign, recipient, RecipientStatus::Failed, Some(error), None)
                    .await
            }
        }
    }

    async fn complete(
        &self,
        campaign: &Campaign,
        recipient: &Recipient,
        status: RecipientStatus,
        reason: Option<String>,
        platform_message_id: Option<String>,
    ) -> MessengerResult<()> {
        let label = match status {
            RecipientStatus::Sent => "sent",
            RecipientStatus::Failed => "failed",
            RecipientStatus::Skipped => "skipped",
            RecipientStatus::Pending => "pending",
        };
        metrics::counter!("broadcast.recipient", "status" => label).increment(1);
        let outcome = RecipientOutcome {
            status,
            reason,
            platform_message_id,
        };
        let updated = self
            .repos
            .campaigns
            .complete_recipient(campaign.id, &recipient.user_id, outcome, self.clock.now())
            .await?;
        if !updated {
            debug!(campaign_id = %campaign.id, user_id = %recipient.user_id, "Recipient already terminal");
        }
        Ok(())
    }
}

fn progress(campaign: &Campaign) -> CampaignProgress {
    CampaignProgress {
        campaign_id: campaign.id,
        status: campaign.status,
        counters: campaign.counters,
    }
}
