use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::rule::ExpectedInput;

/// A connected business page and the credential used to send as it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub workspace_id: Uuid,
    pub name: String,
    pub access_token: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Rule executed when nothing else matches.
    #[serde(default)]
    pub default_rule_id: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

/// An end user known to a page, keyed by (page, user external id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub page_id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last inbound direct message; opens the 24h window.
    #[serde(default)]
    pub last_interaction_at: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn new(page_id: &str, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            page_id: page_id.to_string(),
            user_id: user_id.to_string(),
            name: None,
            created_at: now,
            last_interaction_at: None,
        }
    }
}

/// Active flow position for one (page, user).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub page_id: String,
    pub user_id: String,
    pub rule_id: Uuid,
    pub step_id: String,
    pub expected_input: ExpectedInput,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Addressing carried from a comment trigger. Only the first action of a
/// sequence replies in-thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyContext {
    pub comment_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointStatus {
    Scheduled,
    Processing,
}

/// Persisted resume point for a paused action sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionCheckpoint {
    pub execution_id: Uuid,
    pub page_id: String,
    pub user_id: String,
    pub rule_id: Uuid,
    pub resume_index: usize,
    pub wake_at: DateTime<Utc>,
    #[serde(default)]
    pub reply_context: Option<ReplyContext>,
    #[serde(default)]
    pub ref_log_id: Option<Uuid>,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
}

/// Written each time a rule fires for a user; cooldowns read the latest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleExecution {
    pub rule_id: Uuid,
    pub page_id: String,
    pub user_id: String,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    Received,
    Sent,
    Failed,
    Skipped,
    Error,
}

/// One row of the message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageLog {
    pub id: Uuid,
    pub direction: LogDirection,
    pub status: LogStatus,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub rule_id: Option<Uuid>,
    #[serde(default)]
    pub execution_id: Option<Uuid>,
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
    #[serde(default)]
    pub action_index: Option<usize>,
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub platform_message_id: Option<String>,
    /// Inbound entry that caused this outbound send.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl MessageLog {
    pub fn inbound(page_id: &str, user_id: &str, kind: &str, content: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction: LogDirection::Inbound,
            status: LogStatus::Received,
            page_id: Some(page_id.to_string()),
            user_id: Some(user_id.to_string()),
            rule_id: None,
            execution_id: None,
            campaign_id: None,
            action_index: None,
            kind: kind.to_string(),
            content: content.to_string(),
            error: None,
            platform_message_id: None,
            parent_id: None,
            created_at: now,
        }
    }

    pub fn outbound(
        page_id: &str,
        user_id: &str,
        kind: &str,
        content: &str,
        status: LogStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            direction: LogDirection::Outbound,
            status,
            ..Self::inbound(page_id, user_id, kind, content, now)
        }
    }

    /// Webhook deliveries rejected before any page could be identified.
    pub fn rejected(reason: &str, raw_excerpt: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction: LogDirection::Inbound,
            status: LogStatus::Error,
            page_id: None,
            user_id: None,
            rule_id: None,
            execution_id: None,
            campaign_id: None,
            action_index: None,
            kind: "webhook".to_string(),
            content: raw_excerpt.to_string(),
            error: Some(reason.to_string()),
            platform_message_id: None,
            parent_id: None,
            created_at: now,
        }
    }
}

/// Platform message tags that permit limited sends outside the 24h window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageTag {
    AccountUpdate,
    ConfirmedEventUpdate,
    PostPurchaseUpdate,
    HumanAgent,
}

impl MessageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageTag::AccountUpdate => "ACCOUNT_UPDATE",
            MessageTag::ConfirmedEventUpdate => "CONFIRMED_EVENT_UPDATE",
            MessageTag::PostPurchaseUpdate => "POST_PURCHASE_UPDATE",
            MessageTag::HumanAgent => "HUMAN_AGENT",
        }
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCOUNT_UPDATE" => Ok(MessageTag::AccountUpdate),
            "CONFIRMED_EVENT_UPDATE" => Ok(MessageTag::ConfirmedEventUpdate),
            "POST_PURCHASE_UPDATE" => Ok(MessageTag::PostPurchaseUpdate),
            "HUMAN_AGENT" => Ok(MessageTag::HumanAgent),
            other => Err(format!("unknown message tag '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_expiry_is_strictly_after() {
        let now = Utc::now();
        let session = ConversationSession {
            page_id: "p".into(),
            user_id: "u".into(),
            rule_id: Uuid::new_v4(),
            step_id: "s1".into(),
            expected_input: ExpectedInput::Any,
            expires_at: now,
            updated_at: now,
        };
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_message_tag_parsing() {
        assert_eq!("account_update".parse::<MessageTag>(), Ok(MessageTag::AccountUpdate));
        assert_eq!(MessageTag::HumanAgent.to_string(), "HUMAN_AGENT");
        assert!("PROMO".parse::<MessageTag>().is_err());
    }
}
