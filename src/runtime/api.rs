//! API-facing request/response models.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::core::{EngineError, JobManager, JobStatus, JobStore, RunningSet};
use crate::util::serde::JobId;

/// Queue listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Queue name.
    pub name: String,
    /// Queue concurrency cap.
    pub max_threads: usize,
    /// Global per-group cap applied by this queue.
    pub max_per_group: usize,
    /// Jobs currently running in this queue.
    pub running: usize,
}

/// Job status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Job identifier.
    pub job_id: JobId,
    /// Current status.
    pub status: JobStatus,
    /// Queue the job belongs to.
    pub queue: String,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Earliest next dispatch time for Waiting jobs.
    pub scheduled_at_ms: u128,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Jobs currently holding a slot.
    pub running: usize,
}

/// Configured queues with their live running counts.
#[must_use]
pub fn list_queues(cfg: &EngineConfig, running: &RunningSet) -> Vec<QueueSnapshot> {
    cfg.queues
        .iter()
        .map(|queue| QueueSnapshot {
            name: queue.name.clone(),
            max_threads: queue.max_threads,
            max_per_group: queue.max_per_group,
            running: running.queue_len(&queue.name),
        })
        .collect()
}

/// Status of one job.
///
/// # Errors
///
/// [`EngineError::NotFound`] when the job does not exist, or a store error.
pub async fn job_status<St: JobStore>(
    manager: &JobManager<St>,
    id: JobId,
) -> Result<JobStatusResponse, EngineError> {
    let job = manager
        .job(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("job {id}")))?;
    Ok(JobStatusResponse {
        job_id: job.id,
        status: job.status,
        queue: job.queue,
        retry_count: job.retry_count,
        scheduled_at_ms: job.scheduled_at_ms,
    })
}

/// Return a health payload.
#[must_use]
pub fn health(running: &RunningSet) -> Health {
    Health {
        ok: true,
        running: running.total(),
    }
}
