//! Error types for engine operations.

use thiserror::Error;

/// Errors produced by engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The job store failed or is unavailable.
    #[error("store error: {0}")]
    Store(String),
    /// A request named a queue that is not configured.
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
    /// The referenced job or definition does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// An administrative request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The engine was started twice.
    #[error("engine already started")]
    AlreadyStarted,
    /// Shutdown grace period elapsed with jobs still executing.
    #[error("shutdown grace exceeded with {still_running} job(s) still running")]
    GraceExceeded {
        /// Number of executions still in flight when the grace period ended.
        still_running: usize,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
