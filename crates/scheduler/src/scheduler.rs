use std::sync::Arc;

use chrono::{DateTime, Utc};
use messenger_channels::{MessagingType, RecipientDescriptor};
use messenger_core::clock::{add_millis, Clock};
use messenger_core::config::SchedulerConfig;
use messenger_core::error::{MessengerError, MessengerResult};
use messenger_core::rule::Rule;
use messenger_core::store::{CheckpointStore, ClaimOutcome, Repositories};
use messenger_core::types::{
    CheckpointStatus, Contact, ExecutionCheckpoint, Page, ReplyContext,
};
use messenger_policy::is_window_open;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dispatch::{ActionDispatcher, DispatchContext};
use crate::wake::{NoopNotifier, WakeNotifier, WakeSignal};

/// Input to [`ExecutionScheduler::run`].
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub rule: Rule,
    pub page: Page,
    pub contact: Contact,
    pub start_index: usize,
    pub execution_id: Uuid,
    /// Inbound log row that triggered the run.
    pub ref_log_id: Option<Uuid>,
    pub reply_context: Option<ReplyContext>,
    /// Set on the resume path: the delay of the action at `start_index`
    /// has already elapsed.
    pub is_resuming: bool,
}

impl RunRequest {
    /// A fresh run from the first action.
    pub fn start(rule: Rule, page: Page, contact: Contact) -> Self {
        Self {
            rule,
            page,
            contact,
            start_index: 0,
            execution_id: Uuid::new_v4(),
            ref_log_id: None,
            reply_context: None,
            is_resuming: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "state")]
pub enum RunOutcome {
    Paused {
        #[serde(rename = "resumeIndex")]
        resume_index: usize,
        #[serde(rename = "wakeAt")]
        wake_at: DateTime<Utc>,
    },
    Done {
        sent: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Result of one wake attempt. Everything except `Resumed` is a benign
/// no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed(RunOutcome),
    TooEarly { wake_at: DateTime<Utc> },
    NotFound,
    AlreadyClaimed,
    /// Page, contact or rule vanished; the checkpoint was cleared.
    Aborted { reason: String },
}

impl ResumeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ResumeOutcome::Resumed(RunOutcome::Paused { .. }) => "paused",
            ResumeOutcome::Resumed(RunOutcome::Done { .. }) => "done",
            ResumeOutcome::TooEarly { .. } => "too_early",
            ResumeOutcome::NotFound => "not_found",
            ResumeOutcome::AlreadyClaimed => "already_claimed",
            ResumeOutcome::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    pub execution_id: Uuid,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub count: usize,
    pub outcomes: Vec<SweepOutcome>,
}

pub struct ExecutionScheduler {
    repos: Repositories,
    checkpoints: Arc<dyn CheckpointStore>,
    dispatcher: Arc<ActionDispatcher>,
    notifier: Arc<dyn WakeNotifier>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    max_actions: usize,
}

impl ExecutionScheduler {
    pub fn new(
        repos: Repositories,
        checkpoints: Arc<dyn CheckpointStore>,
        dispatcher: Arc<ActionDispatcher>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repos,
            checkpoints,
            dispatcher,
            notifier: Arc::new(NoopNotifier),
            clock,
            config,
            max_actions: usize::MAX,
        }
    }

    /// Attach a push wake path.
    pub fn with_notifier(mut self, notifier: Arc<dyn WakeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_max_actions(mut self, max_actions: usize) -> Self {
        self.max_actions = max_actions;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// Executes actions from `start_index` until the list ends or an action
    /// with a pending delay is reached.
    pub async fn run(&self, req: RunRequest) -> MessengerResult<RunOutcome> {
        let actions = &req.rule.actions;
        let end = actions.len().min(self.max_actions);
        if end < actions.len() {
            warn!(
                rule_id = %req.rule.id,
                actions = actions.len(),
                limit = self.max_actions,
                "Rule exceeds the per-run action limit; trailing actions ignored"
            );
        }

        let mut sent = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;

        for (i, action) in actions.iter().enumerate().take(end).skip(req.start_index) {
            let delay_elapsed = req.is_resuming && i == req.start_index;
            if action.delay_ms > 0 && !delay_elapsed {
                return self.pause(&req, i, action.delay_ms).await;
            }

            let recipient = match (&req.reply_context, i) {
                (Some(reply), 0) => RecipientDescriptor::ReplyToComment(reply.comment_id.clone()),
                _ => RecipientDescriptor::DirectUser(req.contact.user_id.clone()),
            };
            let ctx = DispatchContext {
                user_id: req.contact.user_id.clone(),
                rule_id: Some(req.rule.id),
                execution_id: Some(req.execution_id),
                campaign_id: None,
                action_index: Some(i),
                parent_log_id: req.ref_log_id,
            };

            // Comment-triggered sequences may follow up privately; anything
            // else needs the user's window to still be open.
            let window_open = is_window_open(req.contact.last_interaction_at, self.clock.now());
            if req.reply_context.is_none() && !window_open {
                self.dispatcher
                    .skip(&req.page, &ctx, &action.kind, "outside 24h window")
                    .await;
                skipped += 1;
                continue;
            }

            let result = self
                .dispatcher
                .dispatch(&req.page, &ctx, &recipient, &action.kind, MessagingType::Response)
                .await;
            if result.is_sent() {
                sent += 1;
            } else {
                failed += 1;
            }
        }

        self.checkpoints.delete(req.execution_id).await?;
        info!(
            execution_id = %req.execution_id,
            rule_id = %req.rule.id,
            user_id = %req.contact.user_id,
            sent,
            failed,
            skipped,
            "Execution finished"
        );
        Ok(RunOutcome::Done {
            sent,
            failed,
            skipped,
        })
    }

    async fn pause(&self, req: &RunRequest, index: usize, delay_ms: u64) -> MessengerResult<RunOutcome> {
        let now = self.clock.now();
        let wake_at = add_millis(now, delay_ms).ok_or_else(|| {
            MessengerError::Validation(format!("action {index}: delay of {delay_ms}ms is out of range"))
        })?;
        let checkpoint = ExecutionCheckpoint {
            execution_id: req.execution_id,
            page_id: req.page.id.clone(),
            user_id: req.contact.user_id.clone(),
            rule_id: req.rule.id,
            resume_index: index,
            wake_at,
            reply_context: req.reply_context.clone(),
            ref_log_id: req.ref_log_id,
            status: CheckpointStatus::Scheduled,
            created_at: now,
        };
        self.checkpoints.save(&checkpoint).await?;

        if self.config.push_enabled {
            let signal = WakeSignal {
                execution_id: req.execution_id,
                wake_at,
            };
            if let Err(e) = self.notifier.schedule(signal).await {
                // The sweep picks it up instead.
                warn!(execution_id = %req.execution_id, error = %e, "Push wake failed");
            }
        }

        metrics::counter!("scheduler.paused").increment(1);
        info!(
            execution_id = %req.execution_id,
            rule_id = %req.rule.id,
            resume_index = index,
            wake_at = %wake_at,
            "Execution paused"
        );
        Ok(RunOutcome::Paused {
            resume_index: index,
            wake_at,
        })
    }

    /// Wake path shared by push consumers, the HTTP wake endpoint and the
    /// sweep. Idempotent: repeated calls after completion return `NotFound`.
    pub async fn resume(&self, execution_id: Uuid) -> MessengerResult<ResumeOutcome> {
        let Some(checkpoint) = self.checkpoints.load(execution_id).await? else {
            // Drop any stale wake-index entry left by an expired checkpoint.
            self.checkpoints.delete(execution_id).await?;
            debug!(execution_id = %execution_id, "Wake for unknown execution");
            return Ok(ResumeOutcome::NotFound);
        };

        let now = self.clock.now();
        let ready_by = add_millis(now, self.config.wake_grace_ms).unwrap_or(now);
        if ready_by < checkpoint.wake_at {
            debug!(
                execution_id = %execution_id,
                wake_at = %checkpoint.wake_at,
                "Wake arrived too early"
            );
            return Ok(ResumeOutcome::TooEarly {
                wake_at: checkpoint.wake_at,
            });
        }

        let claimed = match self.checkpoints.claim(execution_id).await? {
            ClaimOutcome::Claimed(checkpoint) => checkpoint,
            ClaimOutcome::AlreadyProcessing => {
                metrics::counter!("scheduler.claim_lost").increment(1);
                debug!(execution_id = %execution_id, "Checkpoint already claimed");
                return Ok(ResumeOutcome::AlreadyClaimed);
            }
            ClaimOutcome::Missing => return Ok(ResumeOutcome::NotFound),
        };

        let checkpoint = claimed.clone();
        let page = match self.repos.pages.get_page(&checkpoint.page_id).await? {
            Some(page) if page.active => page,
            _ => return self.abort(execution_id, "page missing or inactive").await,
        };
        let Some(contact) = self
            .repos
            .contacts
            .get_contact(&checkpoint.page_id, &checkpoint.user_id)
            .await?
        else {
            return self.abort(execution_id, "contact missing").await;
        };
        let rule = match self.repos.rules.get_rule(checkpoint.rule_id).await? {
            Some(rule) if rule.active => rule,
            _ => return self.abort(execution_id, "rule missing or inactive").await,
        };

        metrics::counter!("scheduler.resumed").increment(1);
        info!(
            execution_id = %execution_id,
            resume_index = checkpoint.resume_index,
            "Resuming execution"
        );
        let outcome = self
            .run(RunRequest {
                rule,
                page,
                contact,
                start_index: checkpoint.resume_index,
                execution_id,
                ref_log_id: checkpoint.ref_log_id,
                reply_context: checkpoint.reply_context,
                is_resuming: true,
            })
            .await;
        match outcome {
            Ok(outcome) => Ok(ResumeOutcome::Resumed(outcome)),
            Err(e) => {
                error!(execution_id = %execution_id, error = %e, "Resumed execution failed");
                self.release(claimed, &e).await;
                Err(e)
            }
        }
    }

    /// Returns a claim taken by a failed resume. Invalid rules are dropped;
    /// anything else goes back to `Scheduled` for the next sweep.
    async fn release(&self, claimed: ExecutionCheckpoint, cause: &MessengerError) {
        let execution_id = claimed.execution_id;
        let released = if matches!(cause, MessengerError::Validation(_)) {
            self.checkpoints.delete(execution_id).await
        } else {
            match self.checkpoints.load(execution_id).await {
                Ok(Some(current)) if current.status == CheckpointStatus::Processing => {
                    self.checkpoints.save(&claimed).await
                }
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            }
        };
        if let Err(e) = released {
            warn!(execution_id = %execution_id, error = %e, "Failed to release claim");
        }
    }

    async fn abort(&self, execution_id: Uuid, reason: &str) -> MessengerResult<ResumeOutcome> {
        self.checkpoints.delete(execution_id).await?;
        warn!(execution_id = %execution_id, reason, "Execution abandoned at resume");
        Ok(ResumeOutcome::Aborted {
            reason: reason.to_string(),
        })
    }

    /// Replays one batch of due checkpoints. Per-execution errors are
    /// reported in the outcome list, never raised.
    pub async fn sweep(&self) -> MessengerResult<SweepReport> {
        let now = self.clock.now();
        let due = self
            .checkpoints
            .due(now, self.config.sweep_batch_size)
            .await?;

        let mut outcomes = Vec::with_capacity(due.len());
        for execution_id in due {
            let outcome = match self.resume(execution_id).await {
                Ok(outcome) => SweepOutcome {
                    execution_id,
                    outcome: outcome.label().to_string(),
                    detail: match outcome {
                        ResumeOutcome::Aborted { reason } => Some(reason),
                        _ => None,
                    },
                },
                Err(e) => SweepOutcome {
                    execution_id,
                    outcome: "error".to_string(),
                    detail: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }

        if !outcomes.is_empty() {
            info!(count = outcomes.len(), "Sweep processed due checkpoints");
        }
        Ok(SweepReport {
            count: outcomes.len(),
            outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;
    use messenger_channels::{PayloadBuilder, RecordingSender};
    use messenger_core::clock::ManualClock;
    use messenger_core::memory::MemoryStore;
    use messenger_core::rule::{Action, ActionKind, MatchOperator, MatchType, Trigger};
    use messenger_core::types::LogStatus;

    /// Memory checkpoints whose `delete` can be switched to fail.
    struct FlakyCheckpoints {
        inner: Arc<MemoryStore>,
        fail_delete: AtomicBool,
    }

    #[async_trait]
    impl CheckpointStore for FlakyCheckpoints {
        async fn save(&self, checkpoint: &ExecutionCheckpoint) -> MessengerResult<()> {
            self.inner.save(checkpoint).await
        }

        async fn load(&self, execution_id: Uuid) -> MessengerResult<Option<ExecutionCheckpoint>> {
            self.inner.load(execution_id).await
        }

        async fn claim(&self, execution_id: Uuid) -> MessengerResult<ClaimOutcome> {
            self.inner.claim(execution_id).await
        }

        async fn delete(&self, execution_id: Uuid) -> MessengerResult<()> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(MessengerError::Store("connection reset".into()));
            }
            self.inner.delete(execution_id).await
        }

        async fn due(&self, now: DateTime<Utc>, limit: usize) -> MessengerResult<Vec<Uuid>> {
            self.inner.due(now, limit).await
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        sender: Arc<RecordingSender>,
        clock: Arc<ManualClock>,
        scheduler: ExecutionScheduler,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        harness_on(store.clone(), store)
    }

    fn harness_on(store: Arc<MemoryStore>, checkpoints: Arc<dyn CheckpointStore>) -> Harness {
        let sender = Arc::new(RecordingSender::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = Arc::new(ActionDispatcher::new(
            sender.clone(),
            store.clone(),
            PayloadBuilder::default(),
            clock.clone(),
        ));
        let scheduler = ExecutionScheduler::new(
            Repositories::from_store(store.clone()),
            checkpoints,
            dispatcher,
            clock.clone(),
            SchedulerConfig::default(),
        );
        Harness {
            store,
            sender,
            clock,
            scheduler,
        }
    }

    fn text(t: &str, delay_ms: u64) -> Action {
        Action {
            delay_ms,
            kind: ActionKind::Text {
                text: t.into(),
                buttons: vec![],
            },
        }
    }

    fn rule(actions: Vec<Action>) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            name: "seq".into(),
            active: true,
            priority: 0,
            cooldown_secs: 0,
            match_type: MatchType::Contains,
            match_operator: MatchOperator::Any,
            keywords: vec![],
            case_sensitive: false,
            normalize_accents: true,
            trigger: Trigger::AnyMessage,
            page_ids: vec![],
            actions,
            flow: None,
            created_at: Utc::now(),
        }
    }

    fn seed(h: &Harness, rule: &Rule) -> (Page, Contact) {
        let page = Page {
            id: "p1".into(),
            workspace_id: rule.workspace_id,
            name: "Shop".into(),
            access_token: "tok".into(),
            active: true,
            default_rule_id: None,
        };
        let mut contact = Contact::new("p1", "u1", h.clock.now());
        contact.last_interaction_at = Some(h.clock.now());
        h.store.insert_page(page.clone());
        h.store.insert_rule(rule.clone()).unwrap();
        h.store.insert_contact(contact.clone());
        (page, contact)
    }

    fn sent_texts(h: &Harness) -> Vec<String> {
        h.sender
            .sent()
            .iter()
            .map(|m| m.message.message["text"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_zero_delay_sequence_completes_without_checkpoint() {
        let h = harness();
        let r = rule(vec![text("a", 0), text("b", 0), text("c", 0)]);
        let (page, contact) = seed(&h, &r);

        let outcome = h.scheduler.run(RunRequest::start(r, page, contact)).await.unwrap();
        assert_eq!(outcome, RunOutcome::Done { sent: 3, failed: 0, skipped: 0 });
        assert_eq!(sent_texts(&h), vec!["a", "b", "c"]);
        assert_eq!(h.store.checkpoint_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_executes_exactly_the_remaining_actions() {
        let h = harness();
        let r = rule(vec![text("a", 0), text("b", 0), text("c", 3000), text("d", 0)]);
        let (page, contact) = seed(&h, &r);
        let req = RunRequest::start(r, page, contact);
        let execution_id = req.execution_id;

        let outcome = h.scheduler.run(req).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Paused { resume_index: 2, .. }));
        assert_eq!(sent_texts(&h), vec!["a", "b"]);

        h.clock.advance(Duration::seconds(3));
        let resumed = h.scheduler.resume(execution_id).await.unwrap();
        assert_eq!(
            resumed,
            ResumeOutcome::Resumed(RunOutcome::Done { sent: 2, failed: 0, skipped: 0 })
        );
        assert_eq!(sent_texts(&h), vec!["a", "b", "c", "d"]);
        assert_eq!(h.store.checkpoint_count(), 0);

        // Repeated wake after completion is a no-op.
        assert_eq!(h.scheduler.resume(execution_id).await.unwrap(), ResumeOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_too_early_wake_does_not_claim() {
        let h = harness();
        let r = rule(vec![text("a", 0), text("b", 5000)]);
        let (page, contact) = seed(&h, &r);
        let req = RunRequest::start(r, page, contact);
        let execution_id = req.execution_id;
        h.scheduler.run(req).await.unwrap();

        h.clock.advance(Duration::seconds(2));
        assert!(matches!(
            h.scheduler.resume(execution_id).await.unwrap(),
            ResumeOutcome::TooEarly { .. }
        ));
        let cp = h.store.load(execution_id).await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_concurrent_resume_claims_once() {
        let h = harness();
        let r = rule(vec![text("a", 1000), text("b", 0)]);
        let (page, contact) = seed(&h, &r);
        let req = RunRequest::start(r, page, contact);
        let execution_id = req.execution_id;
        h.scheduler.run(req).await.unwrap();
        h.clock.advance(Duration::seconds(1));

        let (first, second) = tokio::join!(
            h.scheduler.resume(execution_id),
            h.scheduler.resume(execution_id)
        );
        let outcomes = [first.unwrap(), second.unwrap()];
        let resumed = outcomes
            .iter()
            .filter(|o| matches!(o, ResumeOutcome::Resumed(_)))
            .count();
        assert_eq!(resumed, 1);
        assert_eq!(sent_texts(&h), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_send_does_not_stop_the_run() {
        let h = harness();
        let r = rule(vec![text("a", 0), text("b", 0)]);
        let (page, contact) = seed(&h, &r);
        h.sender.fail_all(true);

        let outcome = h.scheduler.run(RunRequest::start(r, page, contact)).await.unwrap();
        assert_eq!(outcome, RunOutcome::Done { sent: 0, failed: 2, skipped: 0 });
        let statuses: Vec<LogStatus> = h.store.logs().iter().map(|l| l.status).collect();
        assert_eq!(statuses, vec![LogStatus::Failed, LogStatus::Failed]);
    }

    #[tokio::test]
    async fn test_reply_context_addresses_only_first_action() {
        let h = harness();
        let r = rule(vec![text("a", 0), text("b", 0)]);
        let (page, mut contact) = seed(&h, &r);
        contact.last_interaction_at = None;
        let mut req = RunRequest::start(r, page, contact);
        req.reply_context = Some(ReplyContext {
            comment_id: "c1".into(),
        });

        h.scheduler.run(req).await.unwrap();
        let sent = h.sender.sent();
        assert_eq!(sent[0].recipient, RecipientDescriptor::ReplyToComment("c1".into()));
        assert_eq!(sent[1].recipient, RecipientDescriptor::DirectUser("u1".into()));
    }

    #[tokio::test]
    async fn test_closed_window_skips_direct_sends() {
        let h = harness();
        let r = rule(vec![text("a", 0), text("b", 48 * 3600 * 1000)]);
        let (page, contact) = seed(&h, &r);
        let req = RunRequest::start(r, page, contact);
        let execution_id = req.execution_id;
        h.scheduler.run(req).await.unwrap();

        h.clock.advance(Duration::hours(48));
        let outcome = h.scheduler.resume(execution_id).await.unwrap();
        assert_eq!(
            outcome,
            ResumeOutcome::Resumed(RunOutcome::Done { sent: 0, failed: 0, skipped: 1 })
        );
        assert_eq!(h.sender.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_resume_with_inactive_rule_clears_checkpoint() {
        let h = harness();
        let mut r = rule(vec![text("a", 1000)]);
        let (page, contact) = seed(&h, &r);
        let req = RunRequest::start(r.clone(), page, contact);
        let execution_id = req.execution_id;
        h.scheduler.run(req).await.unwrap();

        r.active = false;
        h.store.insert_rule(r).unwrap();
        h.clock.advance(Duration::seconds(1));
        assert!(matches!(
            h.scheduler.resume(execution_id).await.unwrap(),
            ResumeOutcome::Aborted { .. }
        ));
        assert_eq!(h.store.checkpoint_count(), 0);
        assert_eq!(h.sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_resumes_due_checkpoints() {
        let h = harness();
        let r = rule(vec![text("a", 1000), text("b", 0)]);
        let (page, contact) = seed(&h, &r);
        h.scheduler
            .run(RunRequest::start(r.clone(), page.clone(), contact.clone()))
            .await
            .unwrap();
        h.scheduler.run(RunRequest::start(r, page, contact)).await.unwrap();

        assert_eq!(h.scheduler.sweep().await.unwrap().count, 0);

        h.clock.advance(Duration::seconds(1));
        let report = h.scheduler.sweep().await.unwrap();
        assert_eq!(report.count, 2);
        assert!(report.outcomes.iter().all(|o| o.outcome == "done"));
        assert_eq!(h.sender.sent_count(), 4);
    }

    #[tokio::test]
    async fn test_out_of_range_delay_fails_without_checkpoint() {
        let h = harness();
        let mut r = rule(vec![text("a", 0), text("b", 0)]);
        let (page, contact) = seed(&h, &r);
        r.actions[1].delay_ms = 10_000_000_000_000_000;

        let err = h.scheduler.run(RunRequest::start(r, page, contact)).await.unwrap_err();
        assert!(matches!(err, MessengerError::Validation(_)));
        assert_eq!(sent_texts(&h), vec!["a"]);
        assert_eq!(h.store.checkpoint_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_resume_returns_checkpoint_to_sweep() {
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(FlakyCheckpoints {
            inner: store.clone(),
            fail_delete: AtomicBool::new(false),
        });
        let h = harness_on(store, checkpoints.clone());
        let r = rule(vec![text("a", 1000), text("b", 0)]);
        let (page, contact) = seed(&h, &r);
        let req = RunRequest::start(r, page, contact);
        let execution_id = req.execution_id;
        h.scheduler.run(req).await.unwrap();
        h.clock.advance(Duration::seconds(1));

        checkpoints.fail_delete.store(true, Ordering::SeqCst);
        assert!(h.scheduler.resume(execution_id).await.is_err());
        let cp = h.store.load(execution_id).await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Scheduled);
        assert_eq!(cp.resume_index, 0);

        checkpoints.fail_delete.store(false, Ordering::SeqCst);
        let report = h.scheduler.sweep().await.unwrap();
        assert_eq!(report.count, 1);
        assert_eq!(report.outcomes[0].outcome, "done");
        assert_eq!(h.store.checkpoint_count(), 0);
    }
}
