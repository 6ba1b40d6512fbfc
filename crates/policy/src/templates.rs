//! Pre-approved message templates for sends outside the 24h window.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use messenger_core::rule::ActionKind;
use messenger_core::types::MessageTag;
use serde::{Deserialize, Serialize};

use crate::classifier::PolicyCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateCategory {
    Utility,
    FollowUp,
    Reminder,
    Marketing,
}

impl TemplateCategory {
    /// Category a template must carry to satisfy a classifier verdict.
    pub fn for_policy(category: PolicyCategory) -> Option<Self> {
        match category {
            PolicyCategory::UtilityTemplate => Some(TemplateCategory::Utility),
            PolicyCategory::FollowUpTemplate => Some(TemplateCategory::FollowUp),
            PolicyCategory::ReminderTemplate => Some(TemplateCategory::Reminder),
            PolicyCategory::WithinWindow | PolicyCategory::Blocked => None,
        }
    }

    /// Message tag used on the wire when the template carries none.
    pub fn default_tag(&self) -> Option<MessageTag> {
        match self {
            TemplateCategory::Utility => Some(MessageTag::AccountUpdate),
            TemplateCategory::FollowUp => Some(MessageTag::PostPurchaseUpdate),
            TemplateCategory::Reminder => Some(MessageTag::ConfirmedEventUpdate),
            TemplateCategory::Marketing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplate {
    pub id: String,
    pub name: String,
    pub category: TemplateCategory,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub tag: Option<MessageTag>,
    pub message: ActionKind,
    pub created_at: DateTime<Utc>,
}

impl MessageTemplate {
    pub fn wire_tag(&self) -> Option<MessageTag> {
        self.tag.or_else(|| self.category.default_tag())
    }
}

/// Thread-safe template registry keyed by template id.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: DashMap<String, MessageTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, template: MessageTemplate) {
        tracing::info!(
            template_id = %template.id,
            category = ?template.category,
            approved = template.approved,
            "template registered"
        );
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> Option<MessageTemplate> {
        self.templates.get(id).map(|t| t.value().clone())
    }

    pub fn set_approved(&self, id: &str, approved: bool) -> bool {
        match self.templates.get_mut(id) {
            Some(mut t) => {
                t.approved = approved;
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<MessageTemplate> {
        let mut all: Vec<MessageTemplate> =
            self.templates.iter().map(|t| t.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}
