//! Configuration models for queues, poll intervals and shutdown.

pub mod engine;

pub use engine::{EngineConfig, QueueConfig};
