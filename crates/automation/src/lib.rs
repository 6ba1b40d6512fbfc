//! Inbound automation: keyword matching, conversational flows and the
//! webhook pipeline that ties them to the execution scheduler.

#![warn(clippy::unwrap_used)]

pub mod dedup;
pub mod flow;
pub mod keywords;
pub mod matcher;
pub mod pipeline;

pub use dedup::InboundDedup;
pub use flow::{FlowEngine, FlowOutcome};
pub use matcher::{MatchReason, Matcher, RuleMatch};
pub use pipeline::{InboundPipeline, ProcessReport};
