//! Broadcast campaign domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::rule::ActionKind;
use crate::types::MessageTag;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub page_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub audience: AudienceType,
    pub send_mode: SendMode,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub policy_mode: PolicyMode,
    #[serde(default)]
    pub tag: Option<MessageTag>,
    #[schema(value_type = Object)]
    pub message: ActionKind,
    #[serde(default)]
    pub counters: CampaignCounters,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Scheduled campaigns whose time has come, plus anything mid-send.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            CampaignStatus::Sending => true,
            CampaignStatus::Scheduled => self.scheduled_at.map_or(true, |at| at <= now),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AudienceType {
    #[serde(rename = "ACTIVE_24H")]
    ActiveIn24h,
    #[serde(rename = "ACTIVE_7D")]
    ActiveIn7d,
    #[serde(rename = "NEW_TODAY")]
    NewToday,
    #[serde(rename = "ALL")]
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendMode {
    Immediate,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PolicyMode {
    /// Only recipients inside their 24h window are messaged.
    #[serde(rename = "24H_ONLY")]
    Within24hOnly,
    /// Recipients outside the window get a tagged message.
    #[serde(rename = "TAGGED")]
    Tagged,
}

impl PolicyMode {
    pub fn allows_tagged_sends(&self) -> bool {
        matches!(self, PolicyMode::Tagged)
    }
}

/// Aggregates derived from recipient rows. Never incremented in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCounters {
    pub recipients: u64,
    pub pending: u64,
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub campaign_id: Uuid,
    pub page_id: String,
    pub user_id: String,
    pub status: RecipientStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub platform_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Recipient {
    pub fn pending(campaign_id: Uuid, page_id: &str, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            campaign_id,
            page_id: page_id.to_string(),
            user_id: user_id.to_string(),
            status: RecipientStatus::Pending,
            reason: None,
            platform_message_id: None,
            created_at: now,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

/// Terminal outcome written onto a pending recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub status: RecipientStatus,
    pub reason: Option<String>,
    pub platform_message_id: Option<String>,
}
