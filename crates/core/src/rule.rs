//! Automation rule definitions: keyword triggers, ordered action lists,
//! and optional multi-step flows.
//!
//! Rules arrive from storage as JSON and are checked by [`Rule::validate`]
//! before any matching or execution logic sees them.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MessengerError, MessengerResult};

/// Maximum buttons the platform renders on a button template or card.
pub const MAX_BUTTONS: usize = 3;

/// Wildcard literal accepted by flow conditions.
pub const CONDITION_WILDCARD: &str = "*";

/// Longest pause before one action; matches the default checkpoint retention.
pub const MAX_ACTION_DELAY_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Longest per-user cooldown a rule may declare.
pub const MAX_COOLDOWN_SECS: u64 = 365 * 24 * 60 * 60;

/// Longest a flow step may wait for its answer.
pub const MAX_STEP_EXPIRY_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Higher wins.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub match_operator: MatchOperator,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_true")]
    pub normalize_accents: bool,
    #[serde(default)]
    pub trigger: Trigger,
    /// Empty means the rule applies to every page of the workspace.
    #[serde(default)]
    pub page_ids: Vec<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub flow: Option<Flow>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    StartsWith,
    Regex,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOperator {
    #[default]
    Any,
    All,
}

/// What kind of inbound event a rule reacts to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum Trigger {
    #[default]
    AnyMessage,
    /// Direct message from a user whose 24h window had closed.
    Outside24hMessage,
    CommentOnPost {
        /// Empty allows every post.
        #[serde(default, rename = "postIds")]
        post_ids: Vec<String>,
        #[serde(default = "default_true", rename = "ignoreOwnComments")]
        ignore_own_comments: bool,
    },
}

/// Discriminant of [`Trigger`] used to bucket candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    AnyMessage,
    Outside24hMessage,
    CommentOnPost,
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::AnyMessage => TriggerKind::AnyMessage,
            Trigger::Outside24hMessage => TriggerKind::Outside24hMessage,
            Trigger::CommentOnPost { .. } => TriggerKind::CommentOnPost,
        }
    }
}

/// One step of a rule's action sequence. `delay_ms` is waited *before*
/// the action runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(flatten)]
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum ActionKind {
    /// Free text, optionally with up to three buttons.
    Text {
        text: String,
        #[serde(default)]
        buttons: Vec<Button>,
    },
    Card(Card),
    Audio {
        url: String,
    },
    Image {
        url: String,
    },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Text { .. } => "text",
            ActionKind::Card(_) => "card",
            ActionKind::Audio { .. } => "audio",
            ActionKind::Image { .. } => "image",
        }
    }

    /// Short human-readable summary for message logs.
    pub fn summary(&self) -> String {
        match self {
            ActionKind::Text { text, .. } => text.clone(),
            ActionKind::Card(card) => card.title.clone(),
            ActionKind::Audio { url } | ActionKind::Image { url } => url.clone(),
        }
    }

    /// Text the compliance scanner should inspect.
    pub fn scannable_text(&self) -> String {
        match self {
            ActionKind::Text { text, buttons } => {
                let mut out = text.clone();
                for b in buttons {
                    out.push(' ');
                    out.push_str(&b.label);
                }
                out
            }
            ActionKind::Card(card) => {
                format!("{} {}", card.title, card.subtitle.clone().unwrap_or_default())
            }
            ActionKind::Audio { .. } | ActionKind::Image { .. } => String::new(),
        }
    }

    fn buttons(&self) -> &[Button] {
        match self {
            ActionKind::Text { buttons, .. } => buttons,
            ActionKind::Card(card) => &card.buttons,
            ActionKind::Audio { .. } | ActionKind::Image { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub image_url: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub format: CardFormat,
    /// Cropped rendition produced for non-landscape formats.
    #[serde(default)]
    pub cropped_image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardFormat {
    #[default]
    Landscape,
    Square,
    Portrait,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ButtonKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonKind {
    /// Postback carrying `value` back as a new inbound message.
    Reply,
    OpenUrl,
    /// Postback that jumps straight to the rule named by `value`.
    JumpToFlow,
}

/// Multi-turn Q&A script attached to a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Flow {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn first_step(&self) -> Option<&Step> {
        self.steps.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub expected_input: ExpectedInput,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub fallback_message: Option<String>,
    /// Falls back to the configured default when unset.
    #[serde(default)]
    pub expiration_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpectedInput {
    #[default]
    Any,
    ExactKeyword,
    Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Literal to compare against, or `*`.
    pub value: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub next_step_id: Option<String>,
}

impl Condition {
    pub fn is_wildcard(&self) -> bool {
        self.value.trim() == CONDITION_WILDCARD
    }
}

impl Rule {
    /// Returns the flow when it is present and switched on. A rule with an
    /// enabled flow never runs its plain action list.
    pub fn active_flow(&self) -> Option<&Flow> {
        self.flow.as_ref().filter(|f| f.enabled && !f.steps.is_empty())
    }

    pub fn applies_to_page(&self, page_id: &str) -> bool {
        self.page_ids.is_empty() || self.page_ids.iter().any(|p| p == page_id)
    }

    /// Structural checks run at the storage boundary.
    pub fn validate(&self) -> MessengerResult<()> {
        if self.name.trim().is_empty() {
            return Err(MessengerError::Validation("rule name must not be empty".into()));
        }
        if self.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(MessengerError::Validation(format!(
                "cooldown of {}s exceeds {MAX_COOLDOWN_SECS}s",
                self.cooldown_secs
            )));
        }
        for (i, action) in self.actions.iter().enumerate() {
            validate_action(action)
                .map_err(|e| MessengerError::Validation(format!("action {i}: {e}")))?;
        }
        if let Some(flow) = &self.flow {
            let mut seen = HashSet::new();
            for step in &flow.steps {
                if step.id.trim().is_empty() {
                    return Err(MessengerError::Validation("flow step id must not be empty".into()));
                }
                if !seen.insert(step.id.as_str()) {
                    return Err(MessengerError::Validation(format!(
                        "duplicate flow step id '{}'",
                        step.id
                    )));
                }
                if step.expiration_secs.is_some_and(|s| s > MAX_STEP_EXPIRY_SECS) {
                    return Err(MessengerError::Validation(format!(
                        "step '{}' expiry exceeds {MAX_STEP_EXPIRY_SECS}s",
                        step.id
                    )));
                }
                for cond in &step.conditions {
                    for action in &cond.actions {
                        validate_action(action).map_err(|e| {
                            MessengerError::Validation(format!("step '{}': {e}", step.id))
                        })?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Checks one action against platform limits.
pub fn validate_action(action: &Action) -> Result<(), String> {
    if action.delay_ms > MAX_ACTION_DELAY_MS {
        return Err(format!(
            "delay of {}ms exceeds {MAX_ACTION_DELAY_MS}ms",
            action.delay_ms
        ));
    }
    let buttons = action.kind.buttons();
    if buttons.len() > MAX_BUTTONS {
        return Err(format!("at most {MAX_BUTTONS} buttons allowed, got {}", buttons.len()));
    }
    if buttons.iter().any(|b| b.label.trim().is_empty()) {
        return Err("button label must not be empty".into());
    }
    match &action.kind {
        ActionKind::Text { text, .. } if text.trim().is_empty() => {
            Err("text action requires text".into())
        }
        ActionKind::Audio { url } | ActionKind::Image { url } if url.trim().is_empty() => {
            Err("media action requires a url".into())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(t: &str) -> Action {
        Action {
            delay_ms: 0,
            kind: ActionKind::Text {
                text: t.into(),
                buttons: vec![],
            },
        }
    }

    fn rule() -> Rule {
        Rule {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            name: "pricing".into(),
            active: true,
            priority: 1,
            cooldown_secs: 0,
            match_type: MatchType::Contains,
            match_operator: MatchOperator::Any,
            keywords: vec!["preço".into()],
            case_sensitive: false,
            normalize_accents: true,
            trigger: Trigger::AnyMessage,
            page_ids: vec![],
            actions: vec![text("hi")],
            flow: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_action_wire_format() {
        let action: Action =
            serde_json::from_str(r#"{"type":"TEXT","delayMs":5000,"text":"hello"}"#).unwrap();
        assert_eq!(action.delay_ms, 5000);
        assert!(matches!(action.kind, ActionKind::Text { ref text, .. } if text == "hello"));

        let card: Action = serde_json::from_str(
            r#"{"type":"CARD","imageUrl":"https://x/i.png","title":"T","format":"PORTRAIT"}"#,
        )
        .unwrap();
        assert_eq!(card.delay_ms, 0);
        match card.kind {
            ActionKind::Card(c) => assert_eq!(c.format, CardFormat::Portrait),
            other => panic!("expected card, got {other:?}"),
        }
    }

    #[test]
    fn test_trigger_wire_format() {
        let t: Trigger =
            serde_json::from_str(r#"{"type":"COMMENT_ON_POST","postIds":["123_456"]}"#).unwrap();
        assert_eq!(
            t,
            Trigger::CommentOnPost {
                post_ids: vec!["123_456".into()],
                ignore_own_comments: true
            }
        );
        assert_eq!(t.kind(), TriggerKind::CommentOnPost);
    }

    #[test]
    fn test_validate_rejects_too_many_buttons() {
        let mut r = rule();
        let button = Button {
            label: "ok".into(),
            kind: ButtonKind::Reply,
            value: "ok".into(),
        };
        r.actions = vec![Action {
            delay_ms: 0,
            kind: ActionKind::Text {
                text: "pick".into(),
                buttons: vec![button; 4],
            },
        }];
        assert!(matches!(r.validate(), Err(MessengerError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_step_ids() {
        let mut r = rule();
        let step = Step {
            id: "s1".into(),
            prompt: "?".into(),
            expected_input: ExpectedInput::Any,
            conditions: vec![],
            fallback_message: None,
            expiration_secs: None,
        };
        r.flow = Some(Flow {
            enabled: true,
            steps: vec![step.clone(), step],
        });
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_timing_fields() {
        let mut r = rule();
        r.actions[0].delay_ms = MAX_ACTION_DELAY_MS;
        r.cooldown_secs = MAX_COOLDOWN_SECS;
        assert!(r.validate().is_ok());

        r.actions[0].delay_ms = 10_000_000_000_000_000;
        assert!(matches!(r.validate(), Err(MessengerError::Validation(_))));

        let mut r = rule();
        r.cooldown_secs = u64::MAX;
        assert!(matches!(r.validate(), Err(MessengerError::Validation(_))));

        let mut r = rule();
        r.flow = Some(Flow {
            enabled: true,
            steps: vec![Step {
                id: "s1".into(),
                prompt: "?".into(),
                expected_input: ExpectedInput::Any,
                conditions: vec![],
                fallback_message: None,
                expiration_secs: Some(u64::MAX),
            }],
        });
        assert!(matches!(r.validate(), Err(MessengerError::Validation(_))));
    }

    #[test]
    fn test_active_flow_requires_enabled_and_steps() {
        let mut r = rule();
        r.flow = Some(Flow {
            enabled: false,
            steps: vec![],
        });
        assert!(r.active_flow().is_none());
        r.flow = Some(Flow {
            enabled: true,
            steps: vec![],
        });
        assert!(r.active_flow().is_none());
    }

    #[test]
    fn test_page_scope() {
        let mut r = rule();
        assert!(r.applies_to_page("any"));
        r.page_ids = vec!["p1".into()];
        assert!(r.applies_to_page("p1"));
        assert!(!r.applies_to_page("p2"));
    }
}
