//! One-action send with its message-log row. Shared by sequence runs, flow
//! steps and broadcasts so every outbound message is logged the same way.

use std::sync::Arc;

use messenger_channels::{MessagingType, PayloadBuilder, PlatformSender, RecipientDescriptor};
use messenger_core::clock::Clock;
use messenger_core::rule::ActionKind;
use messenger_core::store::LogRepository;
use messenger_core::types::{LogStatus, MessageLog, Page};
use tracing::{error, warn};
use uuid::Uuid;

/// Who and what an outbound message belongs to, for the log row.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub user_id: String,
    pub rule_id: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub action_index: Option<usize>,
    pub parent_log_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Sent { message_id: Option<String> },
    Failed { error: String },
}

impl DispatchResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchResult::Sent { .. })
    }
}

pub struct ActionDispatcher {
    sender: Arc<dyn PlatformSender>,
    logs: Arc<dyn LogRepository>,
    payloads: PayloadBuilder,
    clock: Arc<dyn Clock>,
}

impl ActionDispatcher {
    pub fn new(
        sender: Arc<dyn PlatformSender>,
        logs: Arc<dyn LogRepository>,
        payloads: PayloadBuilder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sender,
            logs,
            payloads,
            clock,
        }
    }

    /// Sends `action` and records the attempt. Send failures come back as
    /// [`DispatchResult::Failed`], never as an error.
    pub async fn dispatch(
        &self,
        page: &Page,
        ctx: &DispatchContext,
        recipient: &RecipientDescriptor,
        action: &ActionKind,
        messaging_type: MessagingType,
    ) -> DispatchResult {
        let message = self.payloads.build(action, messaging_type);
        let result = match self.sender.send(page, recipient, &message).await {
            Ok(receipt) => DispatchResult::Sent {
                message_id: receipt.message_id,
            },
            Err(e) => {
                warn!(
                    page_id = %page.id,
                    user_id = %ctx.user_id,
                    rule_id = ?ctx.rule_id,
                    action_index = ?ctx.action_index,
                    error = %e,
                    "Send failed"
                );
                DispatchResult::Failed {
                    error: e.to_string(),
                }
            }
        };

        let (status, label) = match &result {
            DispatchResult::Sent { .. } => (LogStatus::Sent, "sent"),
            DispatchResult::Failed { .. } => (LogStatus::Failed, "failed"),
        };
        metrics::counter!("dispatch.action", "status" => label).increment(1);

        let mut entry = self.entry(page, ctx, action, status);
        match &result {
            DispatchResult::Sent { message_id } => entry.platform_message_id = message_id.clone(),
            DispatchResult::Failed { error } => entry.error = Some(error.clone()),
        }
        self.append(entry).await;
        result
    }

    /// Records an action that was deliberately not sent.
    pub async fn skip(&self, page: &Page, ctx: &DispatchContext, action: &ActionKind, reason: &str) {
        metrics::counter!("dispatch.action", "status" => "skipped").increment(1);
        let mut entry = self.entry(page, ctx, action, LogStatus::Skipped);
        entry.error = Some(reason.to_string());
        self.append(entry).await;
    }

    fn entry(
        &self,
        page: &Page,
        ctx: &DispatchContext,
        action: &ActionKind,
        status: LogStatus,
    ) -> MessageLog {
        let mut entry = MessageLog::outbound(
            &page.id,
            &ctx.user_id,
            action.label(),
            &action.summary(),
            status,
            self.clock.now(),
        );
        entry.rule_id = ctx.rule_id;
        entry.execution_id = ctx.execution_id;
        entry.campaign_id = ctx.campaign_id;
        entry.action_index = ctx.action_index;
        entry.parent_id = ctx.parent_log_id;
        entry
    }

    async fn append(&self, entry: MessageLog) {
        if let Err(e) = self.logs.append(entry).await {
            error!(error = %e, "Failed to write message log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messenger_channels::RecordingSender;
    use messenger_core::clock::SystemClock;
    use messenger_core::memory::MemoryStore;
    use messenger_core::types::LogDirection;

    fn page() -> Page {
        Page {
            id: "p1".into(),
            workspace_id: Uuid::new_v4(),
            name: "Shop".into(),
            access_token: "tok".into(),
            active: true,
            default_rule_id: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_logs_sent_and_failed() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let dispatcher = ActionDispatcher::new(
            sender.clone(),
            store.clone(),
            PayloadBuilder::default(),
            Arc::new(SystemClock),
        );
        let action = ActionKind::Text {
            text: "hello".into(),
            buttons: vec![],
        };
        let ctx = DispatchContext {
            user_id: "u1".into(),
            action_index: Some(0),
            ..Default::default()
        };

        let ok = dispatcher
            .dispatch(&page(), &ctx, &RecipientDescriptor::DirectUser("u1".into()), &action, MessagingType::Response)
            .await;
        assert!(ok.is_sent());

        sender.fail_for("u2");
        let ctx2 = DispatchContext {
            user_id: "u2".into(),
            ..Default::default()
        };
        let failed = dispatcher
            .dispatch(&page(), &ctx2, &RecipientDescriptor::DirectUser("u2".into()), &action, MessagingType::Response)
            .await;
        assert!(!failed.is_sent());

        let logs = store.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].direction, LogDirection::Outbound);
        assert_eq!(logs[0].status, LogStatus::Sent);
        assert_eq!(logs[0].platform_message_id.as_deref(), Some("m_1"));
        assert_eq!(logs[1].status, LogStatus::Failed);
        assert!(logs[1].error.is_some());
    }
}
