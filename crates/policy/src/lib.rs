//! Messaging-policy enforcement: the 24h window classifier, the stricter
//! compliance guard for template-gated sends, and the template registry
//! the guard validates against.

#![warn(clippy::unwrap_used)]

pub mod classifier;
pub mod compliance;
pub mod error;
pub mod templates;

pub use classifier::{classify, is_window_open, FlowPurpose, PolicyCategory};
pub use compliance::{Clearance, ComplianceGuard};
pub use error::{ComplianceCode, ComplianceError};
pub use templates::{MessageTemplate, TemplateCategory, TemplateRegistry};
