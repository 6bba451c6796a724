//! Runtime adapters and API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{health, job_status, list_queues, Health, JobStatusResponse, QueueSnapshot};
pub use tokio_spawner::TokioSpawner;
