//! One-to-many campaign sends and the template-gated single-recipient
//! utility path. Both consult the messaging policy before anything is
//! handed to the platform.

#![warn(clippy::unwrap_used)]

pub mod audience;
pub mod campaign;
pub mod runner;
pub mod utility;

pub use audience::in_audience;
pub use campaign::{CampaignService, CreateCampaignRequest};
pub use runner::{BroadcastReport, BroadcastRunner, CampaignProgress};
pub use utility::{UtilitySendError, UtilitySendReceipt, UtilitySendRequest, UtilitySender};
