//! Durable delayed execution of rule action sequences.
//!
//! A run walks a rule's actions in order and stops at the first non-zero
//! delay, persisting a checkpoint indexed by wake time. Two wake paths
//! bring it back: a best-effort push (NATS or an in-process timer) and a
//! periodic sweep of the wake index. Both go through the same exclusive
//! claim, so a checkpoint resumes at most once.

#![warn(clippy::unwrap_used)]

pub mod dispatch;
pub mod scheduler;
pub mod wake;

pub use dispatch::{ActionDispatcher, DispatchContext, DispatchResult};
pub use scheduler::{
    ExecutionScheduler, ResumeOutcome, RunOutcome, RunRequest, SweepOutcome, SweepReport,
};
pub use wake::{NatsNotifier, NoopNotifier, TimerNotifier, WakeNotifier, WakeSignal};
