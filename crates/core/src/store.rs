//! Repository interfaces injected into every component.
//!
//! Production deployments back these with a relational store; the
//! [`crate::memory`] module provides DashMap implementations for
//! development and tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::campaign::{Campaign, CampaignCounters, Recipient, RecipientOutcome};
use crate::error::MessengerResult;
use crate::rule::Rule;
use crate::types::{
    Contact, ConversationSession, ExecutionCheckpoint, MessageLog, Page, RuleExecution,
};

#[async_trait]
pub trait PageRepository: Send + Sync {
    async fn get_page(&self, page_id: &str) -> MessengerResult<Option<Page>>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// All rules of a workspace, active or not, in creation order.
    async fn list_rules(&self, workspace_id: Uuid) -> MessengerResult<Vec<Rule>>;
    async fn get_rule(&self, rule_id: Uuid) -> MessengerResult<Option<Rule>>;
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn get_contact(&self, page_id: &str, user_id: &str) -> MessengerResult<Option<Contact>>;
    /// Fetches the contact, creating it without touching the interaction
    /// timestamp when absent.
    async fn get_or_create(
        &self,
        page_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> MessengerResult<Contact>;
    /// Stamps `last_interaction_at = at`, creating the contact when absent.
    /// Returns the contact as it was *before* the update, if it existed.
    async fn record_interaction(
        &self,
        page_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> MessengerResult<Option<Contact>>;
    async fn list_contacts(&self, page_id: &str) -> MessengerResult<Vec<Contact>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get_session(
        &self,
        page_id: &str,
        user_id: &str,
    ) -> MessengerResult<Option<ConversationSession>>;
    /// Upsert: one session per (page, user).
    async fn put_session(&self, session: ConversationSession) -> MessengerResult<()>;
    async fn delete_session(&self, page_id: &str, user_id: &str) -> MessengerResult<()>;
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn record_execution(&self, execution: RuleExecution) -> MessengerResult<()>;
    /// Latest committed execution of `rule_id` for `user_id`.
    async fn last_execution(
        &self,
        rule_id: Uuid,
        user_id: &str,
    ) -> MessengerResult<Option<DateTime<Utc>>>;
}

#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn append(&self, entry: MessageLog) -> MessengerResult<()>;
    async fn list_logs(&self, limit: usize) -> MessengerResult<Vec<MessageLog>>;
}

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn insert_campaign(&self, campaign: Campaign) -> MessengerResult<()>;
    async fn get_campaign(&self, id: Uuid) -> MessengerResult<Option<Campaign>>;
    async fn update_campaign(&self, campaign: &Campaign) -> MessengerResult<()>;
    /// Up to `limit` campaigns that are scheduled-and-due or sending,
    /// oldest first.
    async fn due_campaigns(&self, now: DateTime<Utc>, limit: usize) -> MessengerResult<Vec<Campaign>>;
    /// Inserts rows whose (campaign, user) is not yet present. Returns the
    /// number inserted.
    async fn insert_recipients(&self, recipients: Vec<Recipient>) -> MessengerResult<usize>;
    async fn pending_recipients(&self, campaign_id: Uuid, limit: usize) -> MessengerResult<Vec<Recipient>>;
    /// Moves a pending recipient to a terminal state. Returns `false` when
    /// the row is missing or already terminal.
    async fn complete_recipient(
        &self,
        campaign_id: Uuid,
        user_id: &str,
        outcome: RecipientOutcome,
        at: DateTime<Utc>,
    ) -> MessengerResult<bool>;
    async fn recipient_counts(&self, campaign_id: Uuid) -> MessengerResult<CampaignCounters>;
    async fn list_recipients(&self, campaign_id: Uuid) -> MessengerResult<Vec<Recipient>>;
}

/// Outcome of trying to take ownership of a due checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(ExecutionCheckpoint),
    AlreadyProcessing,
    Missing,
}

/// Durable scheduled work: checkpoint storage with a wake-time index and
/// an exclusive claim.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stores the checkpoint as `Scheduled` and indexes it by `wake_at`.
    /// Overwrites any earlier checkpoint (and claim) for the same id.
    async fn save(&self, checkpoint: &ExecutionCheckpoint) -> MessengerResult<()>;
    async fn load(&self, execution_id: Uuid) -> MessengerResult<Option<ExecutionCheckpoint>>;
    /// Atomically flips `Scheduled` to `Processing`. Only one caller wins.
    async fn claim(&self, execution_id: Uuid) -> MessengerResult<ClaimOutcome>;
    async fn delete(&self, execution_id: Uuid) -> MessengerResult<()>;
    /// Ids whose wake time is at or before `now`, earliest first.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> MessengerResult<Vec<Uuid>>;
}

/// Handles to every relational repository, passed to each component at
/// construction. Checkpoints travel separately since they may live in a
/// different backend.
#[derive(Clone)]
pub struct Repositories {
    pub pages: Arc<dyn PageRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub logs: Arc<dyn LogRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
}

impl Repositories {
    /// Every repository served by one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PageRepository
            + RuleRepository
            + ContactRepository
            + SessionRepository
            + ExecutionRepository
            + LogRepository
            + CampaignRepository
            + 'static,
    {
        Self {
            pages: store.clone(),
            rules: store.clone(),
            contacts: store.clone(),
            sessions: store.clone(),
            executions: store.clone(),
            logs: store.clone(),
            campaigns: store,
        }
    }
}
