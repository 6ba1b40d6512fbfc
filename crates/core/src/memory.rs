//! In-memory store backed by DashMap.
//!
//! Production: replace with PostgreSQL (rules, contacts, campaigns) and
//! Redis (checkpoints). This provides the same trait surface for
//! development and testing.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::campaign::{Campaign, CampaignCounters, Recipient, RecipientOutcome, RecipientStatus};
use crate::error::MessengerResult;
use crate::rule::Rule;
use crate::store::{
    CampaignRepository, CheckpointStore, ClaimOutcome, ContactRepository, ExecutionRepository,
    LogRepository, PageRepository, RuleRepository, SessionRepository,
};
use crate::types::{
    CheckpointStatus, Contact, ConversationSession, ExecutionCheckpoint, MessageLog, Page,
    RuleExecution,
};

type UserKey = (String, String);

/// Message log entries kept before the oldest are dropped.
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

/// Thread-safe in-memory store for every repository trait.
pub struct MemoryStore {
    pages: DashMap<String, Page>,
    rules: DashMap<Uuid, Rule>,
    contacts: DashMap<UserKey, Contact>,
    sessions: DashMap<UserKey, ConversationSession>,
    executions: DashMap<(Uuid, String), DateTime<Utc>>,
    logs: Mutex<VecDeque<MessageLog>>,
    log_capacity: usize,
    campaigns: DashMap<Uuid, Campaign>,
    recipients: DashMap<Uuid, BTreeMap<String, Recipient>>,
    checkpoints: DashMap<Uuid, ExecutionCheckpoint>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Memory store initialized (in-memory, development mode)");
        Self::default()
    }

    /// Keeps at most `capacity` log entries, oldest evicted first.
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            pages: DashMap::new(),
            rules: DashMap::new(),
            contacts: DashMap::new(),
            sessions: DashMap::new(),
            executions: DashMap::new(),
            logs: Mutex::new(VecDeque::new()),
            log_capacity: capacity.max(1),
            campaigns: DashMap::new(),
            recipients: DashMap::new(),
            checkpoints: DashMap::new(),
        }
    }

    pub fn insert_page(&self, page: Page) {
        self.pages.insert(page.id.clone(), page);
    }

    /// Validates and stores a rule.
    pub fn insert_rule(&self, rule: Rule) -> MessengerResult<()> {
        rule.validate()?;
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    pub fn insert_contact(&self, contact: Contact) {
        self.contacts
            .insert((contact.page_id.clone(), contact.user_id.clone()), contact);
    }

    pub fn logs(&self) -> Vec<MessageLog> {
        self.logs.lock().iter().cloned().collect()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }
}

fn key(page_id: &str, user_id: &str) -> UserKey {
    (page_id.to_string(), user_id.to_string())
}

#[async_trait]
impl PageRepository for MemoryStore {
    async fn get_page(&self, page_id: &str) -> MessengerResult<Option<Page>> {
        Ok(self.pages.get(page_id).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl RuleRepository for MemoryStore {
    async fn list_rules(&self, workspace_id: Uuid) -> MessengerResult<Vec<Rule>> {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| r.value().workspace_id == workspace_id)
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rules)
    }

    async fn get_rule(&self, rule_id: Uuid) -> MessengerResult<Option<Rule>> {
        Ok(self.rules.get(&rule_id).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn get_contact(&self, page_id: &str, user_id: &str) -> MessengerResult<Option<Contact>> {
        Ok(self.contacts.get(&key(page_id, user_id)).map(|r| r.value().clone()))
    }

    async fn get_or_create(
        &self,
        page_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> MessengerResult<Contact> {
        let entry = self
            .contacts
            .entry(key(page_id, user_id))
            .or_insert_with(|| Contact::new(page_id, user_id, now));
        Ok(entry.value().clone())
    }

    async fn record_interaction(
        &self,
        page_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> MessengerResult<Option<Contact>> {
        match self.contacts.entry(key(page_id, user_id)) {
            Entry::Occupied(mut occupied) => {
                let before = occupied.get().clone();
                occupied.get_mut().last_interaction_at = Some(at);
                Ok(Some(before))
            }
            Entry::Vacant(vacant) => {
                let mut contact = Contact::new(page_id, user_id, at);
                contact.last_interaction_at = Some(at);
                vacant.insert(contact);
                Ok(None)
            }
        }
    }

    async fn list_contacts(&self, page_id: &str) -> MessengerResult<Vec<Contact>> {
        let mut contacts: Vec<Contact> = self
            .contacts
            .iter()
            .filter(|r| r.value().page_id == page_id)
            .map(|r| r.value().clone())
            .collect();
        contacts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(contacts)
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn get_session(
        &self,
        page_id: &str,
        user_id: &str,
    ) -> MessengerResult<Option<ConversationSession>> {
        Ok(self.sessions.get(&key(page_id, user_id)).map(|r| r.value().clone()))
    }

    async fn put_session(&self, session: ConversationSession) -> MessengerResult<()> {
        self.sessions
            .insert(key(&session.page_id, &session.user_id), session);
        Ok(())
    }

    async fn delete_session(&self, page_id: &str, user_id: &str) -> MessengerResult<()> {
        self.sessions.remove(&key(page_id, user_id));
        Ok(())
    }
}

#[async_trait]
impl ExecutionRepository for MemoryStore {
    async fn record_execution(&self, execution: RuleExecution) -> MessengerResult<()> {
        let mut entry = self
            .executions
            .entry((execution.rule_id, execution.user_id.clone()))
            .or_insert(execution.executed_at);
        if execution.executed_at > *entry {
            *entry = execution.executed_at;
        }
        Ok(())
    }

    async fn last_execution(
        &self,
        rule_id: Uuid,
        user_id: &str,
    ) -> MessengerResult<Option<DateTime<Utc>>> {
        Ok(self
            .executions
            .get(&(rule_id, user_id.to_string()))
            .map(|r| *r.value()))
    }
}

#[async_trait]
impl LogRepository for MemoryStore {
    async fn append(&self, entry: MessageLog) -> MessengerResult<()> {
        let mut logs = self.logs.lock();
        if logs.len() >= self.log_capacity {
            logs.pop_front();
        }
        logs.push_back(entry);
        Ok(())
    }

    async fn list_logs(&self, limit: usize) -> MessengerResult<Vec<MessageLog>> {
        let logs = self.logs.lock();
        Ok(logs.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn insert_campaign(&self, campaign: Campaign) -> MessengerResult<()> {
        self.campaigns.insert(campaign.id, campaign);
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> MessengerResult<Option<Campaign>> {
        Ok(self.campaigns.get(&id).map(|r| r.value().clone()))
    }

    async fn update_campaign(&self, campaign: &Campaign) -> MessengerResult<()> {
        self.campaigns.insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn due_campaigns(&self, now: DateTime<Utc>, limit: usize) -> MessengerResult<Vec<Campaign>> {
        let mut due: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|r| r.value().is_due(now))
            .map(|r| r.value().clone())
            .collect();
        due.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn insert_recipients(&self, recipients: Vec<Recipient>) -> MessengerResult<usize> {
        let mut inserted = 0usize;
        for recipient in recipients {
            let mut rows = self.recipients.entry(recipient.campaign_id).or_default();
            if !rows.contains_key(&recipient.user_id) {
                rows.insert(recipient.user_id.clone(), recipient);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn pending_recipients(&self, campaign_id: Uuid, limit: usize) -> MessengerResult<Vec<Recipient>> {
        Ok(self
            .recipients
            .get(&campaign_id)
            .map(|rows| {
                rows.values()
                    .filter(|r| r.status == RecipientStatus::Pending)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn complete_recipient(
        &self,
        campaign_id: Uuid,
        user_id: &str,
        outcome: RecipientOutcome,
        at: DateTime<Utc>,
    ) -> MessengerResult<bool> {
        let Some(mut rows) = self.recipients.get_mut(&campaign_id) else {
            return Ok(false);
        };
        match rows.get_mut(user_id) {
            Some(row) if row.status == RecipientStatus::Pending => {
                row.status = outcome.status;
                row.reason = outcome.reason;
                row.platform_message_id = outcome.platform_message_id;
                row.completed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recipient_counts(&self, campaign_id: Uuid) -> MessengerResult<CampaignCounters> {
        let mut counters = CampaignCounters::default();
        if let Some(rows) = self.recipients.get(&campaign_id) {
            for row in rows.values() {
                counters.recipients += 1;
                match row.status {
                    RecipientStatus::Pending => counters.pending += 1,
                    RecipientStatus::Sent => counters.sent += 1,
                    RecipientStatus::Failed => counters.failed += 1,
                    RecipientStatus::Skipped => counters.skipped += 1,
                }
            }
        }
        Ok(counters)
    }

    async fn list_recipients(&self, campaign_id: Uuid) -> MessengerResult<Vec<Recipient>> {
        Ok(self
            .recipients
            .get(&campaign_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn save(&self, checkpoint: &ExecutionCheckpoint) -> MessengerResult<()> {
        let mut stored = checkpoint.clone();
        stored.status = CheckpointStatus::Scheduled;
        self.checkpoints.insert(stored.execution_id, stored);
        Ok(())
    }

    async fn load(&self, execution_id: Uuid) -> MessengerResult<Option<ExecutionCheckpoint>> {
        Ok(self.checkpoints.get(&execution_id).map(|r| r.value().clone()))
    }

    async fn claim(&self, execution_id: Uuid) -> MessengerResult<ClaimOutcome> {
        // The shard write lock makes the compare-and-set atomic.
        let Some(mut entry) = self.checkpoints.get_mut(&execution_id) else {
            return Ok(ClaimOutcome::Missing);
        };
        if entry.status == CheckpointStatus::Processing {
            return Ok(ClaimOutcome::AlreadyProcessing);
        }
        entry.status = CheckpointStatus::Processing;
        Ok(ClaimOutcome::Claimed(entry.value().clone()))
    }

    async fn delete(&self, execution_id: Uuid) -> MessengerResult<()> {
        self.checkpoints.remove(&execution_id);
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> MessengerResult<Vec<Uuid>> {
        let mut due: Vec<(DateTime<Utc>, Uuid)> = self
            .checkpoints
            .iter()
            .filter(|r| r.value().status == CheckpointStatus::Scheduled && r.value().wake_at <= now)
            .map(|r| (r.value().wake_at, r.value().execution_id))
            .collect();
        due.sort();
        Ok(due.into_iter().take(limit).map(|(_, id)| id).collect())
    }
}
