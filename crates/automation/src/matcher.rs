//! Rule selection for direct messages and post comments.
//!
//! Selection order for a direct message:
//! 1. a jump directive naming an active in-scope rule,
//! 2. outside-24h rules when the user's window had closed,
//! 3. any-message rules,
//! 4. the page's fallback rule under its own cooldown.
//!
//! Within a bucket candidates are tried by priority (highest first), then
//! creation time, then id. The first whose keywords match and whose
//! cooldown has elapsed wins.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use messenger_channels::CommentEvent;
use messenger_core::clock::{add_secs, Clock};
use messenger_core::config::AutomationConfig;
use messenger_core::error::MessengerResult;
use messenger_core::rule::{Rule, Trigger, TriggerKind};
use messenger_core::store::{ExecutionRepository, RuleRepository};
use messenger_core::types::Page;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::keywords::keywords_match;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Jump,
    Keyword,
    Fallback,
    Comment,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::Jump => "jump",
            MatchReason::Keyword => "keyword",
            MatchReason::Fallback => "fallback",
            MatchReason::Comment => "comment",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub rule: Rule,
    pub reason: MatchReason,
}

pub struct Matcher {
    rules: Arc<dyn RuleRepository>,
    executions: Arc<dyn ExecutionRepository>,
    clock: Arc<dyn Clock>,
    config: AutomationConfig,
}

impl Matcher {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        executions: Arc<dyn ExecutionRepository>,
        clock: Arc<dyn Clock>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            rules,
            executions,
            clock,
            config,
        }
    }

    /// Loads the page's workspace rules and selects one for `text`.
    pub async fn match_message(
        &self,
        page: &Page,
        user_id: &str,
        text: &str,
        is_outside_window: bool,
    ) -> MessengerResult<Option<RuleMatch>> {
        let rules = self.rules.list_rules(page.workspace_id).await?;
        self.select(&rules, page, user_id, text, is_outside_window).await
    }

    /// Selection over an explicit rule set.
    pub async fn select(
        &self,
        rules: &[Rule],
        page: &Page,
        user_id: &str,
        text: &str,
        is_outside_window: bool,
    ) -> MessengerResult<Option<RuleMatch>> {
        if let Some(rule) = self.resolve_jump(rules, page, text) {
            return Ok(Some(self.matched(rule.clone(), MatchReason::Jump, user_id)));
        }

        let buckets: &[TriggerKind] = if is_outside_window {
            &[TriggerKind::Outside24hMessage, TriggerKind::AnyMessage]
        } else {
            &[TriggerKind::AnyMessage]
        };
        let now = self.clock.now();
        for kind in buckets {
            let candidates = ordered(rules.iter().filter(|r| {
                r.active && r.applies_to_page(&page.id) && r.trigger.kind() == *kind
            }));
            for rule in candidates {
                if keywords_match(rule, text)
                    && self.cooled_down(rule.id, user_id, rule.cooldown_secs, now).await?
                {
                    return Ok(Some(self.matched(rule.clone(), MatchReason::Keyword, user_id)));
                }
            }
        }

        self.fallback(rules, page, user_id, now).await
    }

    /// Comment-on-post rules for a new comment. The page's own comments are
    /// skipped by rules that ask for it.
    pub async fn match_comment(
        &self,
        page: &Page,
        comment: &CommentEvent,
    ) -> MessengerResult<Option<RuleMatch>> {
        let rules = self.rules.list_rules(page.workspace_id).await?;
        let now = self.clock.now();
        let candidates = ordered(rules.iter().filter(|r| {
            r.active
                && r.applies_to_page(&page.id)
                && match &r.trigger {
                    Trigger::CommentOnPost {
                        post_ids,
                        ignore_own_comments,
                    } => {
                        !(*ignore_own_comments && comment.author_id == page.id)
                            && post_allowed(post_ids, &comment.post_id)
                    }
                    _ => false,
                }
        }));
        for rule in candidates {
            if keywords_match(rule, &comment.text)
                && self
                    .cooled_down(rule.id, &comment.author_id, rule.cooldown_secs, now)
                    .await?
            {
                return Ok(Some(self.matched(rule.clone(), MatchReason::Comment, &comment.author_id)));
            }
        }
        Ok(None)
    }

    /// `JUMP_TO_RULE:<id or exact name>`. Unresolved jumps fall through.
    fn resolve_jump<'a>(&self, rules: &'a [Rule], page: &Page, text: &str) -> Option<&'a Rule> {
        let target = text.trim().strip_prefix(self.config.jump_prefix.as_str())?.trim();
        if target.is_empty() {
            return None;
        }
        let by_id = Uuid::parse_str(target).ok();
        let found = rules
            .iter()
            .filter(|r| r.active && r.applies_to_page(&page.id))
            .find(|r| Some(r.id) == by_id || r.name == target);
        if found.is_none() {
            debug!(page_id = %page.id, target, "Jump target not found, matching normally");
        }
        found
    }

    async fn fallback(
        &self,
        rules: &[Rule],
        page: &Page,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> MessengerResult<Option<RuleMatch>> {
        let Some(fallback_id) = page.default_rule_id else {
            return Ok(None);
        };
        let Some(rule) = rules.iter().find(|r| r.id == fallback_id && r.active) else {
            return Ok(None);
        };
        if !self
            .cooled_down(rule.id, user_id, self.config.fallback_cooldown_secs, now)
            .await?
        {
            debug!(rule_id = %rule.id, user_id, "Fallback rule cooling down");
            return Ok(None);
        }
        Ok(Some(self.matched(rule.clone(), MatchReason::Fallback, user_id)))
    }

    /// Reads the latest committed execution on every call.
    async fn cooled_down(
        &self,
        rule_id: Uuid,
        user_id: &str,
        cooldown_secs: u64,
        now: DateTime<Utc>,
    ) -> MessengerResult<bool> {
        if cooldown_secs == 0 {
            return Ok(true);
        }
        Ok(match self.executions.last_execution(rule_id, user_id).await? {
            // A cooldown that runs past the calendar never elapses.
            Some(last) => add_secs(last, cooldown_secs).is_some_and(|ready| now >= ready),
            None => true,
        })
    }

    fn matched(&self, rule: Rule, reason: MatchReason, user_id: &str) -> RuleMatch {
        metrics::counter!("matcher.matched", "reason" => reason.as_str()).increment(1);
        debug!(rule_id = %rule.id, rule = %rule.name, user_id, reason = reason.as_str(), "Rule matched");
        RuleMatch { rule, reason }
    }
}

fn ordered<'a>(rules: impl Iterator<Item = &'a Rule>) -> Vec<&'a Rule> {
    let mut rules: Vec<&Rule> = rules.collect();
    rules.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    rules
}

/// Platform post ids are `{page}_{post}`; configured ids may carry either
/// form.
fn post_allowed(allowed: &[String], post_id: &str) -> bool {
    allowed.is_empty()
        || allowed.iter().any(|id| {
            id == post_id
                || post_id.ends_with(&format!("_{id}"))
                || id.ends_with(&format!("_{post_id}"))
        })
}
