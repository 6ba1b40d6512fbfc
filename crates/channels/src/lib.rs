//! Messenger platform plumbing: recipient addressing, Graph API payload
//! construction, the outbound sender and inbound webhook handling.

#![warn(clippy::unwrap_used)]

pub mod addressing;
pub mod graph;
pub mod mock;
pub mod payload;
pub mod sender;
pub mod webhook;

pub use addressing::{MessagingType, RecipientDescriptor};
pub use graph::GraphApiSender;
pub use mock::RecordingSender;
pub use payload::{OutboundMessage, PayloadBuilder};
pub use sender::{PlatformSender, SendError, SendReceipt};
pub use webhook::{CommentEvent, MessagingEvent, PageEvent, WebhookError, WebhookPayload};
