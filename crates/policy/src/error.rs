use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable reason a send was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceCode {
    MarketingContentBlocked,
    CategoryMismatch,
    TemplateNotApproved,
    MissingTemplate,
    OutsideWindowBlocked,
}

impl ComplianceCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceCode::MarketingContentBlocked => "marketing_content_blocked",
            ComplianceCode::CategoryMismatch => "category_mismatch",
            ComplianceCode::TemplateNotApproved => "template_not_approved",
            ComplianceCode::MissingTemplate => "missing_template",
            ComplianceCode::OutsideWindowBlocked => "outside_window_blocked",
        }
    }
}

impl fmt::Display for ComplianceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy violation surfaced to the caller as-is, never downgraded into a
/// different send mode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ComplianceError {
    pub code: ComplianceCode,
    pub message: String,
}

impl ComplianceError {
    pub fn new(code: ComplianceCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
