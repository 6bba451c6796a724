//! Job execution traits and the job-type handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::job::{JobInstance, JobOutcome};
use crate::core::AppResult;
use crate::util::serde::JobId;

/// Everything an executor gets to know about a dispatched job.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job identifier.
    pub job_id: JobId,
    /// Job-type tag.
    pub job_type: String,
    /// Opaque parameters.
    pub parameters: String,
    /// De-duplication key.
    pub key: String,
    /// Fairness partition.
    pub group_key: String,
    /// Queue the job was dispatched from.
    pub queue: String,
    /// Failed attempts before this one.
    pub retry_count: u32,
    /// Fires when the engine shuts down. Observing it is optional; the
    /// engine never aborts a running job.
    pub shutdown: CancellationToken,
}

impl JobContext {
    /// Context for a dispatched instance.
    #[must_use]
    pub fn for_job(job: &JobInstance, shutdown: CancellationToken) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.clone(),
            parameters: job.parameters.clone(),
            key: job.key.clone(),
            group_key: job.group_key.clone(),
            queue: job.queue.clone(),
            retry_count: job.retry_count,
            shutdown,
        }
    }
}

/// Performs the business logic of a job.
///
/// An `Err` is treated exactly like [`JobOutcome::Failed`], and so is a panic.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_job_engine::core::{AppResult, JobContext, JobExecutor, JobOutcome};
///
/// #[derive(Clone)]
/// struct Downloader;
///
/// #[async_trait]
/// impl JobExecutor for Downloader {
///     async fn execute(&self, ctx: JobContext) -> AppResult<JobOutcome> {
///         fetch(&ctx.parameters).await?;
///         Ok(JobOutcome::Success)
///     }
/// }
/// ```
#[async_trait]
pub trait JobExecutor: Send + Sync + Clone + 'static {
    /// Run the job and report its outcome.
    async fn execute(&self, ctx: JobContext) -> AppResult<JobOutcome>;
}

/// Handler for a single job type, registered in a [`HandlerRegistry`].
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job-type tag this handler serves.
    fn job_type(&self) -> &str;

    /// Run one job.
    async fn run(&self, ctx: &JobContext) -> AppResult<JobOutcome>;
}

/// Executor routing jobs to handlers by job type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`, replacing any handler for the same job type.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        Arc::make_mut(&mut self.handlers).insert(handler.job_type().to_string(), handler);
        self
    }

    /// Registered job types.
    #[must_use]
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[async_trait]
impl JobExecutor for HandlerRegistry {
    async fn execute(&self, ctx: JobContext) -> AppResult<JobOutcome> {
        let Some(handler) = self.handlers.get(&ctx.job_type) else {
            tracing::error!(job_type = %ctx.job_type, "no handler registered for job type");
            return Err(anyhow!("no handler registered for job type `{}`", ctx.job_type));
        };
        tracing::debug!(job_type = %ctx.job_type, group = %ctx.group_key, "executing job");
        let outcome = handler.run(&ctx).await?;
        tracing::debug!(job_type = %ctx.job_type, group = %ctx.group_key, ?outcome, "job finished");
        Ok(outcome)
    }
}
