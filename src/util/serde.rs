//! Serializable identifiers and scheduling enums shared across the crate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a job instance.
pub type JobId = Uuid;

/// Identifier of a recurring job definition.
pub type DefinitionId = Uuid;

/// Scheduling priority. Higher priorities are dispatched first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Dispatched before normal work.
    High,
    /// Dispatched before everything else.
    Critical,
}

/// Allocate a fresh random identifier.
#[must_use]
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}
