//! Startup fixtures for the in-memory store: pages, rules and message
//! templates read from one JSON file.

use std::path::Path;

use anyhow::Context;
use messenger_core::memory::MemoryStore;
use messenger_core::rule::Rule;
use messenger_core::types::Page;
use messenger_policy::{MessageTemplate, TemplateRegistry};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub pages: Vec<Page>,
    pub rules: Vec<Rule>,
    pub templates: Vec<MessageTemplate>,
}

impl Seed {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("parsing seed file")
    }

    /// Loads everything or nothing past the first invalid rule.
    pub fn apply(self, store: &MemoryStore, registry: &TemplateRegistry) -> anyhow::Result<()> {
        let (pages, rules, templates) = (self.pages.len(), self.rules.len(), self.templates.len());
        for rule in &self.rules {
            rule.validate()
                .with_context(|| format!("rule '{}' is invalid", rule.name))?;
        }
        for page in self.pages {
            store.insert_page(page);
        }
        for rule in self.rules {
            store.insert_rule(rule)?;
        }
        for template in self.templates {
            registry.register(template);
        }
        info!(pages, rules, templates, "Seed data loaded");
        Ok(())
    }
}
