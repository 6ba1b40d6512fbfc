//! Inbound webhook pipeline:
//! verify → parse → dedup → contact upsert → log → flow → matcher → run.

use std::sync::Arc;

use messenger_channels::webhook::{self, CommentEvent, MessagingEvent};
use messenger_channels::WebhookError;
use messenger_core::clock::Clock;
use messenger_core::config::AutomationConfig;
use messenger_core::error::{MessengerError, MessengerResult};
use messenger_core::store::Repositories;
use messenger_core::types::{MessageLog, Page, ReplyContext, RuleExecution};
use messenger_policy::is_window_open;
use messenger_scheduler::{ActionDispatcher, ExecutionScheduler, RunRequest};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dedup::InboundDedup;
use crate::flow::FlowEngine;
use crate::matcher::{Matcher, RuleMatch};

const REJECTED_EXCERPT_BYTES: usize = 512;

/// What one webhook delivery produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub pages: usize,
    pub messages: usize,
    pub comments: usize,
    pub duplicates: usize,
    pub matched: usize,
    pub flow_steps: usize,
    pub duplicate_payload: bool,
}

pub struct InboundPipeline {
    repos: Repositories,
    matcher: Matcher,
    flows: FlowEngine,
    scheduler: Arc<ExecutionScheduler>,
    dedup: InboundDedup,
    clock: Arc<dyn Clock>,
    jump_prefix: String,
    app_secret: String,
}

impl InboundPipeline {
    pub fn new(
        repos: Repositories,
        scheduler: Arc<ExecutionScheduler>,
        dispatcher: Arc<ActionDispatcher>,
        clock: Arc<dyn Clock>,
        config: &AutomationConfig,
        app_secret: impl Into<String>,
    ) -> Self {
        let matcher = Matcher::new(
            repos.rules.clone(),
            repos.executions.clone(),
            clock.clone(),
            config.clone(),
        );
        let flows = FlowEngine::new(repos.clone(), dispatcher, clock.clone(), config.clone());
        Self {
            repos,
            matcher,
            flows,
            scheduler,
            dedup: InboundDedup::new(config.dedup_window_secs),
            clock,
            jump_prefix: config.jump_prefix.clone(),
            app_secret: app_secret.into(),
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn flows(&self) -> &FlowEngine {
        &self.flows
    }

    pub fn dedup(&self) -> &InboundDedup {
        &self.dedup
    }

    /// Verifies and processes one delivery. Only verification and parse
    /// failures are errors; problems with individual messages are logged
    /// and skipped.
    pub async fn handle_webhook(
        &self,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Result<ProcessReport, WebhookError> {
        let now = self.clock.now();

        let verified = if self.app_secret.is_empty() {
            warn!("Webhook app secret is not configured; rejecting delivery");
            Err(WebhookError::InvalidSignature)
        } else {
            webhook::verify_signature(raw, signature, &self.app_secret)
        };
        let payload = match verified.and_then(|_| webhook::parse(raw)) {
            Ok(payload) => payload,
            Err(e) => {
                self.reject(raw, &e).await;
                return Err(e);
            }
        };

        if self.dedup.is_duplicate_payload(raw, now) {
            debug!("Duplicate webhook payload ignored");
            return Ok(ProcessReport {
                duplicate_payload: true,
                ..Default::default()
            });
        }

        let mut report = ProcessReport::default();
        for event in &payload.events {
            let page = match self.repos.pages.get_page(&event.page_id).await {
                Ok(Some(page)) if page.active => page,
                Ok(_) => {
                    debug!(page_id = %event.page_id, "Event for unknown or inactive page ignored");
                    continue;
                }
                Err(e) => {
                    error!(page_id = %event.page_id, error = %e, "Failed to load page");
                    continue;
                }
            };
            report.pages += 1;

            for message in &event.messages {
                if let Err(e) = self.process_message(&page, message, &mut report).await {
                    error!(
                        page_id = %page.id,
                        user_id = %message.sender_id,
                        error = %e,
                        "Failed to process inbound message"
                    );
                }
            }
            for comment in &event.comments {
                if let Err(e) = self.process_comment(&page, comment, &mut report).await {
                    error!(
                        page_id = %page.id,
                        comment_id = %comment.comment_id,
                        error = %e,
                        "Failed to process comment"
                    );
                }
            }
        }

        metrics::counter!("webhook.processed").increment(1);
        Ok(report)
    }

    async fn process_message(
        &self,
        page: &Page,
        message: &MessagingEvent,
        report: &mut ProcessReport,
    ) -> MessengerResult<()> {
        if message.is_echo || message.sender_id == page.id {
            return Ok(());
        }
        let now = self.clock.now();
        let user_id = message.sender_id.as_str();

        if let Some(mid) = &message.message_id {
            if self.dedup.is_duplicate_message(&page.id, mid, now) {
                debug!(page_id = %page.id, mid = %mid, "Duplicate message ignored");
                report.duplicates += 1;
                return Ok(());
            }
        }
        report.messages += 1;

        let previous = self
            .repos
            .contacts
            .record_interaction(&page.id, user_id, now)
            .await?;
        // A first-ever message is not "outside" anything.
        let outside_window = previous
            .and_then(|c| c.last_interaction_at)
            .is_some_and(|last| !is_window_open(Some(last), now));

        let text = message.effective_text().unwrap_or_default();
        let mut entry = MessageLog::inbound(&page.id, user_id, message.kind(), text, now);
        entry.platform_message_id = message.message_id.clone();
        let log_id = entry.id;
        self.repos.logs.append(entry).await?;

        if text.trim().is_empty() {
            debug!(page_id = %page.id, user_id, kind = message.kind(), "No text to match");
            return Ok(());
        }

        // A jump directive abandons whatever flow the user was in.
        if text.trim_start().starts_with(self.jump_prefix.as_str()) {
            self.flows.clear(&page.id, user_id).await?;
        } else {
            let outcome = self.flows.handle_inbound(page, user_id, text, Some(log_id)).await?;
            if outcome.handled() {
                report.flow_steps += 1;
                return Ok(());
            }
        }

        let Some(matched) = self
            .matcher
            .match_message(page, user_id, text, outside_window)
            .await?
        else {
            debug!(page_id = %page.id, user_id, "No rule matched");
            return Ok(());
        };
        report.matched += 1;
        self.execute(page, user_id, matched, log_id, None).await
    }

    async fn process_comment(
        &self,
        page: &Page,
        comment: &CommentEvent,
        report: &mut ProcessReport,
    ) -> MessengerResult<()> {
        if !comment.is_new() {
            return Ok(());
        }
        let now = self.clock.now();
        if self.dedup.is_duplicate_comment(&comment.comment_id, now) {
            report.duplicates += 1;
            return Ok(());
        }
        report.comments += 1;

        let mut entry = MessageLog::inbound(&page.id, &comment.author_id, "comment", &comment.text, now);
        entry.platform_message_id = Some(comment.comment_id.clone());
        let log_id = entry.id;
        self.repos.logs.append(entry).await?;

        let Some(matched) = self.matcher.match_comment(page, comment).await? else {
            return Ok(());
        };
        report.matched += 1;
        // Commenting does not open the messaging window, so the contact is
        // created without an interaction stamp.
        self.repos
            .contacts
            .get_or_create(&page.id, &comment.author_id, now)
            .await?;
        let reply = ReplyContext {
            comment_id: comment.comment_id.clone(),
        };
        self.execute(page, &comment.author_id, matched, log_id, Some(reply))
            .await
    }

    /// Records the execution, then enters the rule's flow or runs its
    /// action list.
    async fn execute(
        &self,
        page: &Page,
        user_id: &str,
        matched: RuleMatch,
        log_id: Uuid,
        reply_context: Option<ReplyContext>,
    ) -> MessengerResult<()> {
        let rule = matched.rule;
        self.repos
            .executions
            .record_execution(RuleExecution {
                rule_id: rule.id,
                page_id: page.id.clone(),
                user_id: user_id.to_string(),
                executed_at: self.clock.now(),
            })
            .await?;

        if rule.active_flow().is_some() {
            self.flows
                .start(&rule, page, user_id, Some(log_id), reply_context)
                .await?;
            return Ok(());
        }

        let contact = self
            .repos
            .contacts
            .get_contact(&page.id, user_id)
            .await?
            .ok_or_else(|| MessengerError::not_found("contact", format!("{}/{user_id}", page.id)))?;
        let rule_id = rule.id;
        let mut req = RunRequest::start(rule, page.clone(), contact);
        req.ref_log_id = Some(log_id);
        req.reply_context = reply_context;
        let execution_id = req.execution_id;
        let outcome = self.scheduler.run(req).await?;
        info!(
            page_id = %page.id,
            user_id,
            rule_id = %rule_id,
            execution_id = %execution_id,
            reason = matched.reason.as_str(),
            outcome = ?outcome,
            "Rule executed"
        );
        Ok(())
    }

    async fn reject(&self, raw: &[u8], reason: &WebhookError) {
        warn!(error = %reason, bytes = raw.len(), "Webhook rejected");
        metrics::counter!("webhook.rejected").increment(1);
        let excerpt = String::from_utf8_lossy(&raw[..raw.len().min(REJECTED_EXCERPT_BYTES)]);
        let entry = MessageLog::rejected(&reason.to_string(), &excerpt, self.clock.now());
        if let Err(e) = self.repos.logs.append(entry).await {
            error!(error = %e, "Failed to record rejected webhook");
        }
    }
}
