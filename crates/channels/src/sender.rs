use async_trait::async_trait;
use messenger_core::types::Page;
use thiserror::Error;

use crate::addressing::RecipientDescriptor;
use crate::payload::OutboundMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("platform rejected send ({code:?}): {message}")]
    Platform { code: Option<i64>, message: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Outbound send capability. Implementations own retries (none by default)
/// and credential handling; callers only see success or a [`SendError`].
#[async_trait]
pub trait PlatformSender: Send + Sync {
    async fn send(
        &self,
        page: &Page,
        recipient: &RecipientDescriptor,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, SendError>;
}
