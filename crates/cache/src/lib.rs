#![warn(clippy::unwrap_used)]

pub mod client;
pub mod local;

pub use client::RedisCheckpointStore;
pub use local::SeenCache;
