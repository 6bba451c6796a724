//! Abstract job store consumed by the engine.
//!
//! The engine owns the only scheduling view of a store. Implementations must
//! make `enqueue`, `schedule` and `update_status` atomic with respect to each
//! other; `update_status` is a compare-and-set on the current status.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::job::{JobInstance, JobStatus, NewJob, RecurringJobDefinition, Transition};
use crate::core::EngineError;
use crate::util::serde::JobId;

/// Durable storage for job instances and recurring definitions.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Insert a Waiting job, de-duplicating on `key`.
    ///
    /// A live (Waiting or Running) job with the same key is left untouched and
    /// its id returned. A terminal job with the same key is re-armed as a
    /// fresh Waiting job.
    async fn enqueue(&self, job: NewJob) -> Result<JobId, EngineError>;

    /// Insert or reschedule a job to become eligible at `job.scheduled_at_ms`.
    ///
    /// An existing non-running job with the same key is moved back to Waiting
    /// with the new parameters and scheduled time.
    async fn schedule(&self, job: NewJob) -> Result<JobId, EngineError>;

    /// Waiting jobs of `queue` whose scheduled time is at or before `now_ms`.
    async fn query_waiting(
        &self,
        queue: &str,
        now_ms: u128,
    ) -> Result<Vec<JobInstance>, EngineError>;

    /// Number of Running jobs per group key, across every queue.
    async fn running_group_counts(&self) -> Result<HashMap<String, usize>, EngineError>;

    /// Apply `transition` if the job currently has status `expected`.
    ///
    /// Returns `false` without error when the job is missing or in another state.
    async fn update_status(
        &self,
        id: JobId,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<bool, EngineError>;

    /// Fetch a job by id.
    async fn get_job(&self, id: JobId) -> Result<Option<JobInstance>, EngineError>;

    /// Remove jobs by id, returning how many existed.
    async fn delete_jobs(&self, ids: &[JobId]) -> Result<usize, EngineError>;

    /// Remove non-running jobs with this job type and instance key,
    /// returning how many were removed.
    async fn delete_jobs_by_type_and_key(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<usize, EngineError>;

    /// Move every Running job back to Waiting. Used once at startup.
    async fn reset_running(&self) -> Result<usize, EngineError>;

    /// Enabled definitions whose next run is at or before `now_ms`.
    async fn load_due_definitions(
        &self,
        now_ms: u128,
    ) -> Result<Vec<RecurringJobDefinition>, EngineError>;

    /// Insert or replace a definition by id.
    async fn save_definition(&self, def: RecurringJobDefinition) -> Result<(), EngineError>;

    /// Look up a definition by its key.
    async fn find_definition_by_key(
        &self,
        key: &str,
    ) -> Result<Option<RecurringJobDefinition>, EngineError>;

    /// Definitions with the given job type.
    async fn definitions_by_type(
        &self,
        job_type: &str,
    ) -> Result<Vec<RecurringJobDefinition>, EngineError>;

    /// Set the interval of every definition with this job type, returning
    /// how many were updated. Next run times are left as they are.
    async fn set_interval_by_type(
        &self,
        job_type: &str,
        interval: Duration,
    ) -> Result<usize, EngineError>;

    /// Every definition.
    async fn all_definitions(&self) -> Result<Vec<RecurringJobDefinition>, EngineError>;

    /// Delete definitions matching type and parameters.
    async fn delete_definition_by_type_and_parameters(
        &self,
        job_type: &str,
        parameters: &str,
    ) -> Result<bool, EngineError>;

    /// Delete the definition matching type and key.
    async fn delete_definition_by_type_and_key(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<bool, EngineError>;
}
