//! Recording sender for tests and dry-run deployments.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use messenger_core::types::Page;
use parking_lot::Mutex;

use crate::addressing::RecipientDescriptor;
use crate::payload::OutboundMessage;
use crate::sender::{PlatformSender, SendError, SendReceipt};

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub page_id: String,
    pub recipient: RecipientDescriptor,
    pub message: OutboundMessage,
}

/// Captures every send instead of calling the platform. Individual users,
/// or every send, can be made to fail.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    failing_users: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    seq: AtomicU64,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn fail_for(&self, user_id: &str) {
        self.failing_users.lock().insert(user_id.to_string());
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlatformSender for RecordingSender {
    async fn send(
        &self,
        page: &Page,
        recipient: &RecipientDescriptor,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, SendError> {
        let target = match recipient {
            RecipientDescriptor::DirectUser(id) | RecipientDescriptor::ReplyToComment(id) => id,
        };
        if self.fail_all.load(Ordering::SeqCst) || self.failing_users.lock().contains(target) {
            return Err(SendError::Platform {
                code: Some(551),
                message: "This person isn't available right now.".into(),
            });
        }
        self.sent.lock().push(SentMessage {
            page_id: page.id.clone(),
            recipient: recipient.clone(),
            message: message.clone(),
        });
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SendReceipt {
            message_id: Some(format!("m_{n}")),
        })
    }
}
