//! Inbound webhook: signature verification and event parsing.
//!
//! Deliveries are signed with `X-Hub-Signature-256: sha256=<hex>`, an
//! HMAC-SHA256 of the raw body keyed by the app secret. Anything that fails
//! verification or parsing is rejected before it reaches matching.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("signature mismatch")]
    InvalidSignature,

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported webhook object '{0}'")]
    UnsupportedObject(String),
}

/// Constant-time HMAC-SHA256 check of `raw` against a `sha256=<hex>` header.
pub fn verify_signature(
    raw: &[u8],
    signature_header: Option<&str>,
    app_secret: &str,
) -> Result<(), WebhookError> {
    let signature = signature_header
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(WebhookError::MissingSignature)?;
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return Err(WebhookError::InvalidSignature);
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return Err(WebhookError::InvalidSignature);
    };
    mac.update(raw);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Hex signature header for `raw`, as the platform would send it.
pub fn sign(raw: &[u8], app_secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes()).ok()?;
    mac.update(raw);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    pub events: Vec<PageEvent>,
}

/// Everything one delivery carried for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEvent {
    pub page_id: String,
    pub messages: Vec<MessagingEvent>,
    pub comments: Vec<CommentEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessagingEvent {
    pub sender_id: String,
    pub recipient_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub text: Option<String>,
    pub quick_reply_payload: Option<String>,
    pub postback_payload: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Copies of the page's own outbound messages.
    pub is_echo: bool,
}

impl MessagingEvent {
    /// Text to match on: a postback payload wins over a quick reply, which
    /// wins over typed text.
    pub fn effective_text(&self) -> Option<&str> {
        self.postback_payload
            .as_deref()
            .or(self.quick_reply_payload.as_deref())
            .or(self.text.as_deref())
    }

    pub fn kind(&self) -> &'static str {
        if self.postback_payload.is_some() {
            "postback"
        } else if self.quick_reply_payload.is_some() {
            "quick_reply"
        } else if self.text.is_some() {
            "text"
        } else if !self.attachments.is_empty() {
            "attachment"
        } else {
            "unknown"
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub kind: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentEvent {
    pub post_id: String,
    pub comment_id: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub text: String,
    /// `add`, `edited` or `remove`.
    pub verb: String,
    pub parent_id: Option<String>,
}

impl CommentEvent {
    pub fn is_new(&self) -> bool {
        self.verb == "add"
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawPayload {
    object: String,
    #[serde(default)]
    entry: Vec<RawEntry>,
}

#[derive(Deserialize)]
struct RawEntry {
    id: String,
    #[serde(default)]
    messaging: Vec<RawMessaging>,
    #[serde(default)]
    changes: Vec<RawChange>,
}

#[derive(Deserialize)]
struct RawParty {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawMessaging {
    sender: RawParty,
    recipient: RawParty,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    postback: Option<RawPostback>,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    mid: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
    #[serde(default)]
    quick_reply: Option<RawQuickReply>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
}

#[derive(Deserialize)]
struct RawQuickReply {
    payload: String,
}

#[derive(Deserialize)]
struct RawPostback {
    #[serde(default)]
    mid: Option<String>,
    #[serde(default)]
    payload: Option<String>,
}

#[derive(Deserialize)]
struct RawAttachment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<RawAttachmentPayload>,
}

#[derive(Deserialize)]
struct RawAttachmentPayload {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawChange {
    field: String,
    value: RawChangeValue,
}

#[derive(Deserialize)]
struct RawChangeValue {
    #[serde(default)]
    item: Option<String>,
    #[serde(default)]
    verb: Option<String>,
    #[serde(default)]
    comment_id: Option<String>,
    #[serde(default)]
    post_id: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    from: Option<RawParty>,
    #[serde(default)]
    message: Option<String>,
}

/// Parses a verified delivery. Entries without usable events are kept with
/// empty lists so callers can still see which pages were touched.
pub fn parse(raw: &[u8]) -> Result<WebhookPayload, WebhookError> {
    let payload: RawPayload = serde_json::from_slice(raw)?;
    if payload.object != "page" {
        return Err(WebhookError::UnsupportedObject(payload.object));
    }

    let events = payload
        .entry
        .into_iter()
        .map(|entry| PageEvent {
            page_id: entry.id,
            messages: entry.messaging.into_iter().map(messaging_event).collect(),
            comments: entry.changes.into_iter().filter_map(comment_event).collect(),
        })
        .collect();
    Ok(WebhookPayload { events })
}

fn messaging_event(raw: RawMessaging) -> MessagingEvent {
    let timestamp = raw
        .timestamp
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    let mut event = MessagingEvent {
        sender_id: raw.sender.id,
        recipient_id: raw.recipient.id,
        timestamp,
        message_id: None,
        text: None,
        quick_reply_payload: None,
        postback_payload: None,
        attachments: Vec::new(),
        is_echo: false,
    };
    if let Some(message) = raw.message {
        event.message_id = message.mid;
        event.text = message.text;
        event.is_echo = message.is_echo;
        event.quick_reply_payload = message.quick_reply.map(|q| q.payload);
        event.attachments = message
            .attachments
            .into_iter()
            .map(|a| Attachment {
                kind: a.kind,
                url: a.payload.and_then(|p| p.url),
            })
            .collect();
    }
    if let Some(postback) = raw.postback {
        event.message_id = event.message_id.or(postback.mid);
        event.postback_payload = postback.payload;
    }
    event
}

fn comment_event(change: RawChange) -> Option<CommentEvent> {
    let value = change.value;
    if change.field != "feed" || value.item.as_deref() != Some("comment") {
        return None;
    }
    let from = value.from?;
    Some(CommentEvent {
        post_id: value.post_id?,
        comment_id: value.comment_id?,
        author_id: from.id,
        author_name: from.name,
        text: value.message.unwrap_or_default(),
        verb: value.verb.unwrap_or_else(|| "add".to_string()),
        parent_id: value.parent_id,
    })
}
