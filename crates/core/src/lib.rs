//! Shared domain model for the Messenger automation engine: rules and
//! flows, contacts and sessions, checkpoints, campaigns, the repository
//! traits every component is wired against, and configuration.

#![warn(clippy::unwrap_used)]

pub mod campaign;
pub mod clock;
pub mod config;
pub mod error;
pub mod memory;
pub mod rule;
pub mod store;
pub mod text;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{MessengerError, MessengerResult};
pub use memory::MemoryStore;
pub use store::Repositories;
