//! Per-(page, user) conversational flow sessions.
//!
//! A session waits on one step. Each inbound message is validated against
//! the step's expected input, then the step's conditions are scanned in
//! order and the first match wins. Condition actions are sent right away;
//! they never go through the delayed scheduler.

use std::sync::Arc;

use messenger_channels::{MessagingType, RecipientDescriptor};
use messenger_core::clock::{add_secs, Clock};
use messenger_core::config::AutomationConfig;
use messenger_core::error::{MessengerError, MessengerResult};
use messenger_core::rule::{ActionKind, Condition, ExpectedInput, Rule, Step};
use messenger_core::store::Repositories;
use messenger_core::types::{ConversationSession, Page, ReplyContext};
use messenger_scheduler::{ActionDispatcher, DispatchContext};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FlowOutcome {
    /// No session for this user; the message goes to rule matching.
    NoSession,
    /// The session had expired and was removed; the message goes to rule
    /// matching.
    Expired,
    /// The session pointed at a rule, flow or step that no longer exists.
    Abandoned,
    Started { step_id: String },
    /// Numeric step received something that is not a number.
    InvalidNumber { step_id: String },
    Advanced { step_id: String },
    Completed,
    /// Nothing matched; the session keeps waiting on the same step.
    Retry { step_id: String },
}

impl FlowOutcome {
    /// Whether the inbound message was consumed by the flow.
    pub fn handled(&self) -> bool {
        !matches!(
            self,
            FlowOutcome::NoSession | FlowOutcome::Expired | FlowOutcome::Abandoned
        )
    }
}

pub struct FlowEngine {
    repos: Repositories,
    dispatcher: Arc<ActionDispatcher>,
    clock: Arc<dyn Clock>,
    config: AutomationConfig,
}

impl FlowEngine {
    pub fn new(
        repos: Repositories,
        dispatcher: Arc<ActionDispatcher>,
        clock: Arc<dyn Clock>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            repos,
            dispatcher,
            clock,
            config,
        }
    }

    /// Enters the rule's first step, replacing any session the user had.
    pub async fn start(
        &self,
        rule: &Rule,
        page: &Page,
        user_id: &str,
        parent_log_id: Option<Uuid>,
        reply_context: Option<ReplyContext>,
    ) -> MessengerResult<FlowOutcome> {
        let Some(step) = rule.active_flow().and_then(|f| f.first_step()) else {
            return Ok(FlowOutcome::Abandoned);
        };
        self.enter_step(rule, page, user_id, step).await?;

        let recipient = match reply_context {
            Some(reply) => RecipientDescriptor::ReplyToComment(reply.comment_id),
            None => RecipientDescriptor::DirectUser(user_id.to_string()),
        };
        self.send_text(page, rule, user_id, parent_log_id, &recipient, &step.prompt)
            .await;

        info!(page_id = %page.id, user_id, rule_id = %rule.id, step_id = %step.id, "Flow started");
        metrics::counter!("flow.transition", "outcome" => "started").increment(1);
        Ok(FlowOutcome::Started {
            step_id: step.id.clone(),
        })
    }

    /// Feeds one inbound message to the user's active session, if any.
    pub async fn handle_inbound(
        &self,
        page: &Page,
        user_id: &str,
        text: &str,
        parent_log_id: Option<Uuid>,
    ) -> MessengerResult<FlowOutcome> {
        let Some(session) = self.repos.sessions.get_session(&page.id, user_id).await? else {
            return Ok(FlowOutcome::NoSession);
        };

        let now = self.clock.now();
        if session.is_expired(now) {
            self.repos.sessions.delete_session(&page.id, user_id).await?;
            debug!(page_id = %page.id, user_id, step_id = %session.step_id, "Flow session expired");
            metrics::counter!("flow.transition", "outcome" => "expired").increment(1);
            return Ok(FlowOutcome::Expired);
        }

        let rule = self
            .repos
            .rules
            .get_rule(session.rule_id)
            .await?
            .filter(|r| r.active);
        let step = rule
            .as_ref()
            .and_then(|r| r.active_flow())
            .and_then(|f| f.step(&session.step_id))
            .cloned();
        let (Some(rule), Some(step)) = (rule, step) else {
            self.repos.sessions.delete_session(&page.id, user_id).await?;
            info!(
                page_id = %page.id,
                user_id,
                rule_id = %session.rule_id,
                step_id = %session.step_id,
                "Flow session abandoned; rule or step is gone"
            );
            return Ok(FlowOutcome::Abandoned);
        };

        let direct = RecipientDescriptor::DirectUser(user_id.to_string());

        let number = if step.expected_input == ExpectedInput::Number {
            match parse_number(text) {
                Some(n) => Some(n),
                None => {
                    let reply = step
                        .fallback_message
                        .as_deref()
                        .unwrap_or(&self.config.invalid_number_message);
                    self.send_text(page, &rule, user_id, parent_log_id, &direct, reply)
                        .await;
                    metrics::counter!("flow.transition", "outcome" => "invalid_number").increment(1);
                    return Ok(FlowOutcome::InvalidNumber { step_id: step.id });
                }
            }
        } else {
            None
        };

        let Some(condition) = step
            .conditions
            .iter()
            .find(|c| condition_matches(c, text, number))
        else {
            if let Some(fallback) = &step.fallback_message {
                self.send_text(page, &rule, user_id, parent_log_id, &direct, fallback)
                    .await;
            }
            metrics::counter!("flow.transition", "outcome" => "retry").increment(1);
            return Ok(FlowOutcome::Retry { step_id: step.id });
        };

        for (i, action) in condition.actions.iter().enumerate() {
            let ctx = DispatchContext {
                user_id: user_id.to_string(),
                rule_id: Some(rule.id),
                action_index: Some(i),
                parent_log_id,
                ..Default::default()
            };
            self.dispatcher
                .dispatch(page, &ctx, &direct, &action.kind, MessagingType::Response)
                .await;
        }

        let next = condition
            .next_step_id
            .as_deref()
            .and_then(|id| rule.active_flow().and_then(|f| f.step(id)));
        match next {
            Some(next) => {
                self.enter_step(&rule, page, user_id, next).await?;
                self.send_text(page, &rule, user_id, parent_log_id, &direct, &next.prompt)
                    .await;
                debug!(page_id = %page.id, user_id, from = %step.id, to = %next.id, "Flow advanced");
                metrics::counter!("flow.transition", "outcome" => "advanced").increment(1);
                Ok(FlowOutcome::Advanced {
                    step_id: next.id.clone(),
                })
            }
            None => {
                self.repos.sessions.delete_session(&page.id, user_id).await?;
                info!(page_id = %page.id, user_id, rule_id = %rule.id, "Flow completed");
                metrics::counter!("flow.transition", "outcome" => "completed").increment(1);
                Ok(FlowOutcome::Completed)
            }
        }
    }

    pub async fn clear(&self, page_id: &str, user_id: &str) -> MessengerResult<()> {
        self.repos.sessions.delete_session(page_id, user_id).await
    }

    async fn enter_step(
        &self,
        rule: &Rule,
        page: &Page,
        user_id: &str,
        step: &Step,
    ) -> MessengerResult<()> {
        let now = self.clock.now();
        let ttl = step
            .expiration_secs
            .unwrap_or(self.config.default_step_expiry_secs);
        let expires_at = add_secs(now, ttl).ok_or_else(|| {
            MessengerError::Validation(format!("step '{}': expiry of {ttl}s is out of range", step.id))
        })?;
        self.repos
            .sessions
            .put_session(ConversationSession {
                page_id: page.id.clone(),
                user_id: user_id.to_string(),
                rule_id: rule.id,
                step_id: step.id.clone(),
                expected_input: step.expected_input,
                expires_at,
                updated_at: now,
            })
            .await
    }

    async fn send_text(
        &self,
        page: &Page,
        rule: &Rule,
        user_id: &str,
        parent_log_id: Option<Uuid>,
        recipient: &RecipientDescriptor,
        text: &str,
    ) {
        if text.trim().is_empty() {
            return;
        }
        let ctx = DispatchContext {
            user_id: user_id.to_string(),
            rule_id: Some(rule.id),
            parent_log_id,
            ..Default::default()
        };
        let action = ActionKind::Text {
            text: text.to_string(),
            buttons: vec![],
        };
        self.dispatcher
            .dispatch(page, &ctx, recipient, &action, MessagingType::Response)
            .await;
    }
}

/// Accepts a decimal comma.
fn parse_number(input: &str) -> Option<f64> {
    input
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

fn condition_matches(condition: &Condition, input: &str, number: Option<f64>) -> bool {
    if condition.is_wildcard() {
        return true;
    }
    match number {
        Some(n) => parse_number(&condition.value).is_some_and(|v| v == n),
        None => condition.value.trim().to_lowercase() == input.trim().to_lowercase(),
    }
}
