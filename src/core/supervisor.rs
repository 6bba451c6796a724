//! Execution supervisor: runs one dispatched job and records its outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::core::events::{emit, EventSink, JobEventKind};
use crate::core::executor::{JobContext, JobExecutor};
use crate::core::job::{JobInstance, JobOutcome, JobStatus, Transition};
use crate::core::running::Reservation;
use crate::core::store::JobStore;
use crate::core::EngineError;
use crate::util::clock::{add_duration, now_ms};

/// How failed attempts are retried for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which the job becomes Failed.
    pub max_retries: u32,
    /// Delay before a failed job is eligible again.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Transition for a job that just failed after `retry_count` earlier failures.
    #[must_use]
    pub fn after_failure(&self, retry_count: u32, now_ms: u128) -> Transition {
        let retry_count = retry_count.saturating_add(1);
        if retry_count >= self.max_retries {
            Transition::Fail {
                finished_at_ms: now_ms,
                retry_count,
            }
        } else {
            Transition::Retry {
                scheduled_at_ms: add_duration(now_ms, self.backoff),
                retry_count,
            }
        }
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(queue: &QueueConfig) -> Self {
        Self {
            max_retries: queue.max_retries,
            backoff: queue.retry_backoff(),
        }
    }
}

/// Owns one job from hand-off to slot release.
pub struct ExecutionSupervisor<St, E> {
    store: Arc<St>,
    executor: E,
    retry: RetryPolicy,
    events: Option<Arc<dyn EventSink>>,
    shutdown: CancellationToken,
}

impl<St, E> ExecutionSupervisor<St, E>
where
    St: JobStore,
    E: JobExecutor,
{
    /// Create a supervisor for jobs of one queue.
    pub fn new(
        store: Arc<St>,
        executor: E,
        retry: RetryPolicy,
        events: Option<Arc<dyn EventSink>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            executor,
            retry,
            events,
            shutdown,
        }
    }

    /// Execute `job`, persist the outcome and release the reservation.
    ///
    /// Returns the outcome that was applied. Executor errors and panics count
    /// as [`JobOutcome::Failed`]. Store failures are logged, not returned; the
    /// reservation is released whatever happens, including when this future
    /// is dropped before completion.
    pub async fn run(self, job: JobInstance, reservation: Reservation) -> JobOutcome {
        let ctx = JobContext::for_job(&job, self.shutdown.child_token());
        let outcome = match AssertUnwindSafe(self.executor.execute(ctx)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    error = %err,
                    "job returned an error"
                );
                JobOutcome::Failed
            }
            Err(panic) => {
                tracing::error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    panic = %panic_message(panic.as_ref()),
                    "job panicked"
                );
                JobOutcome::Failed
            }
        };

        if let Err(err) = self.apply(&job, outcome).await {
            tracing::error!(
                job_id = %job.id,
                ?outcome,
                error = %err,
                "failed to record job outcome"
            );
        }
        drop(reservation);
        outcome
    }

    async fn apply(&self, job: &JobInstance, outcome: JobOutcome) -> Result<(), EngineError> {
        let now = now_ms();
        match outcome {
            JobOutcome::Success => {
                self.transition(
                    job,
                    Transition::Complete { finished_at_ms: now },
                    JobEventKind::Completed,
                )
                .await?;
            }
            JobOutcome::Failed => {
                let transition = self.retry.after_failure(job.retry_count, now);
                let kind = match transition {
                    Transition::Fail { retry_count, .. } => {
                        tracing::warn!(job_id = %job.id, retry_count, "job failed permanently");
                        JobEventKind::Failed
                    }
                    _ => JobEventKind::Retrying,
                };
                self.transition(job, transition, kind).await?;
            }
            JobOutcome::Handled => {
                tracing::debug!(job_id = %job.id, "job state handled by executor");
                emit(self.events.as_ref(), job, JobEventKind::Handled, None);
            }
            JobOutcome::Delete => {
                self.transition(
                    job,
                    Transition::Complete { finished_at_ms: now },
                    JobEventKind::Completed,
                )
                .await?;
                let removed = self
                    .store
                    .delete_definition_by_type_and_parameters(&job.job_type, &job.parameters)
                    .await?;
                tracing::info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    removed,
                    "recurring definition deleted"
                );
                emit(self.events.as_ref(), job, JobEventKind::Deleted, None);
            }
        }
        Ok(())
    }

    async fn transition(
        &self,
        job: &JobInstance,
        transition: Transition,
        kind: JobEventKind,
    ) -> Result<(), EngineError> {
        let applied = self
            .store
            .update_status(job.id, JobStatus::Running, transition)
            .await?;
        if applied {
            let detail = match transition {
                Transition::Retry { retry_count, .. } | Transition::Fail { retry_count, .. } => {
                    Some(format!("retry_count={retry_count}"))
                }
                _ => None,
            };
            emit(self.events.as_ref(), job, kind, detail);
        } else {
            tracing::warn!(
                job_id = %job.id,
                status = ?transition.target(),
                "job no longer running; outcome not applied"
            );
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
