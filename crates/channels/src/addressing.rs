use messenger_core::types::MessageTag;
use serde::{Deserialize, Serialize};

/// Who a send is addressed to. A comment reply and a direct message are
/// mutually exclusive on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum RecipientDescriptor {
    DirectUser(String),
    ReplyToComment(String),
}

impl RecipientDescriptor {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RecipientDescriptor::DirectUser(id) => serde_json::json!({ "id": id }),
            RecipientDescriptor::ReplyToComment(id) => serde_json::json!({ "comment_id": id }),
        }
    }
}

/// `messaging_type` of a send. Tagged sends are the only way to reach a
/// user outside the 24h window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagingType {
    Response,
    MessageTag(MessageTag),
}

impl MessagingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagingType::Response => "RESPONSE",
            MessagingType::MessageTag(_) => "MESSAGE_TAG",
        }
    }

    pub fn tag(&self) -> Option<MessageTag> {
        match self {
            MessagingType::Response => None,
            MessagingType::MessageTag(tag) => Some(*tag),
        }
    }
}
