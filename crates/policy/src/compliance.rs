//! Compliance guard for direct, template-gated sends.
//!
//! Layered on top of the classifier: outside the 24h window every send
//! needs an approved template of the requested category, and any text that
//! reads like marketing is refused no matter what category was declared.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use messenger_core::text::fold;
use messenger_core::types::MessageTag;
use tracing::warn;

use crate::classifier::is_window_open;
use crate::error::{ComplianceCode, ComplianceError};
use crate::templates::{MessageTemplate, TemplateCategory, TemplateRegistry};

/// Folded (lowercase, accent-free) phrases treated as promotional.
const MARKETING_TERMS: &[&str] = &[
    "promo",
    "promocao",
    "desconto",
    "discount",
    "oferta",
    "offer",
    "sale",
    "cupom",
    "coupon",
    "black friday",
    "frete gratis",
    "free shipping",
    "compre agora",
    "buy now",
    "% off",
    "limited time",
    "ultimas unidades",
];

/// What the guard allows the caller to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Clearance {
    /// Window open: a standard response, free-form content allowed.
    WithinWindow { template: Option<MessageTemplate> },
    /// Window closed: only this approved template, sent with `tag`.
    Tagged {
        template: MessageTemplate,
        tag: MessageTag,
    },
}

pub struct ComplianceGuard {
    registry: Arc<TemplateRegistry>,
    terms: Vec<String>,
}

impl ComplianceGuard {
    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        Self {
            registry,
            terms: MARKETING_TERMS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Replaces the built-in phrase list. Phrases are folded on the way in.
    pub fn with_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.terms = terms.into_iter().map(|t| fold(t.as_ref())).collect();
        self
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// First marketing phrase found in `text`, if any.
    pub fn marketing_term(&self, text: &str) -> Option<&str> {
        let folded = fold(text);
        self.terms
            .iter()
            .find(|term| contains_term(&folded, term))
            .map(String::as_str)
    }

    pub fn check(
        &self,
        last_interaction: Option<DateTime<Utc>>,
        requested: TemplateCategory,
        template_id: Option<&str>,
        free_text: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Clearance, ComplianceError> {
        let result = self.evaluate(last_interaction, requested, template_id, free_text, now);
        if let Err(e) = &result {
            metrics::counter!("compliance.violations", "code" => e.code.as_str()).increment(1);
            warn!(code = %e.code, template_id = ?template_id, "send refused: {}", e.message);
        }
        result
    }

    fn evaluate(
        &self,
        last_interaction: Option<DateTime<Utc>>,
        requested: TemplateCategory,
        template_id: Option<&str>,
        free_text: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Clearance, ComplianceError> {
        if is_window_open(last_interaction, now) {
            let template = match template_id {
                Some(id) => Some(self.lookup(id)?),
                None => None,
            };
            return Ok(Clearance::WithinWindow { template });
        }

        let id = template_id.ok_or_else(|| {
            ComplianceError::new(
                ComplianceCode::MissingTemplate,
                "a template is required outside the 24h window",
            )
        })?;
        let template = self.lookup(id)?;

        let scanned = format!(
            "{} {}",
            free_text.unwrap_or_default(),
            template.message.scannable_text()
        );
        if let Some(term) = self.marketing_term(&scanned) {
            return Err(ComplianceError::new(
                ComplianceCode::MarketingContentBlocked,
                format!("content contains promotional phrase '{term}'"),
            ));
        }
        if requested == TemplateCategory::Marketing {
            return Err(ComplianceError::new(
                ComplianceCode::OutsideWindowBlocked,
                "marketing sends require an open 24h window",
            ));
        }
        if !template.approved {
            return Err(ComplianceError::new(
                ComplianceCode::TemplateNotApproved,
                format!("template '{}' is not approved", template.id),
            ));
        }
        if template.category != requested {
            return Err(ComplianceError::new(
                ComplianceCode::CategoryMismatch,
                format!(
                    "template '{}' is {:?}, request declared {:?}",
                    template.id, template.category, requested
                ),
            ));
        }
        let tag = template.wire_tag().ok_or_else(|| {
            ComplianceError::new(
                ComplianceCode::OutsideWindowBlocked,
                format!("template '{}' has no message tag", template.id),
            )
        })?;
        Ok(Clearance::Tagged { template, tag })
    }

    fn lookup(&self, id: &str) -> Result<MessageTemplate, ComplianceError> {
        self.registry.get(id).ok_or_else(|| {
            ComplianceError::new(
                ComplianceCode::MissingTemplate,
                format!("template '{id}' is not registered"),
            )
        })
    }
}

/// Word-boundary match for alphanumeric phrases so "sale" does not hit
/// "salesforce"; symbol phrases like "% off" match as substrings.
fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let bounded = term.chars().next().is_some_and(char::is_alphanumeric);
    haystack.match_indices(term).any(|(start, _)| {
        if !bounded {
            return true;
        }
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + term.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
