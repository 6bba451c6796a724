//! Queue dispatcher loop.
//!
//! The dispatcher is the only component that moves jobs from Waiting to
//! Running. Each tick walks the configured queues in order, asks the fairness
//! selector which candidates to start, reserves a slot for each one in the
//! shared [`RunningSet`], persists the Running status and hands the job to an
//! [`ExecutionSupervisor`] on a tracked task. The tick never waits for
//! execution.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{EngineConfig, QueueConfig};
use crate::core::events::{emit, EventSink, JobEventKind};
use crate::core::executor::JobExecutor;
use crate::core::fairness::select_fair;
use crate::core::job::{JobStatus, Transition};
use crate::core::running::{ReserveRejection, RunningSet};
use crate::core::spawn::Spawn;
use crate::core::store::JobStore;
use crate::core::supervisor::{ExecutionSupervisor, RetryPolicy};
use crate::core::EngineError;
use crate::util::clock::now_ms;
use crate::util::serde::JobId;

/// What a dispatcher tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Jobs handed to a supervisor, in dispatch order.
    pub dispatched: Vec<JobId>,
    /// Dispatched count per queue.
    pub per_queue: BTreeMap<String, usize>,
    /// Selected jobs skipped at reservation or because they left Waiting.
    pub skipped: usize,
    /// Reservations released because persisting Running failed.
    pub rolled_back: usize,
    /// Queues whose tick was aborted by a store error.
    pub failed_queues: Vec<String>,
}

/// Polls the store and starts jobs under the queue and group caps.
pub struct QueueDispatcher<St, E, S> {
    config: Arc<EngineConfig>,
    store: Arc<St>,
    executor: E,
    spawner: S,
    running: Arc<RunningSet>,
    tracker: TaskTracker,
    events: Option<Arc<dyn EventSink>>,
    shutdown: CancellationToken,
}

impl<St, E, S> QueueDispatcher<St, E, S>
where
    St: JobStore,
    E: JobExecutor,
    S: Spawn + Send + Sync + 'static,
{
    /// Create a dispatcher sharing `running` and `tracker` with its owner.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<St>,
        executor: E,
        spawner: S,
        running: Arc<RunningSet>,
        tracker: TaskTracker,
        events: Option<Arc<dyn EventSink>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            executor,
            spawner,
            running,
            tracker,
            events,
            shutdown,
        }
    }

    /// Run one pass over every queue.
    ///
    /// A store failure aborts only the affected queue; the remaining queues
    /// are still processed.
    pub async fn tick(&self, now_ms: u128) -> DispatchReport {
        let mut report = DispatchReport::default();
        for queue in &self.config.queues {
            if let Err(err) = self.dispatch_queue(queue, now_ms, &mut report).await {
                tracing::error!(queue = %queue.name, error = %err, "dispatch aborted for queue");
                report.failed_queues.push(queue.name.clone());
            }
        }
        report
    }

    /// Dispatch eligible jobs from a single queue.
    ///
    /// # Errors
    ///
    /// Returns the store error that stopped the queue. Any reservation taken
    /// for the failing job has already been released.
    pub async fn dispatch_queue(
        &self,
        queue: &QueueConfig,
        now_ms: u128,
        report: &mut DispatchReport,
    ) -> Result<(), EngineError> {
        let running = self.running.queue_len(&queue.name);
        if running >= queue.max_threads {
            tracing::debug!(queue = %queue.name, running, "queue at capacity");
            return Ok(());
        }

        let candidates = self.store.query_waiting(&queue.name, now_ms).await?;
        if candidates.is_empty() {
            return Ok(());
        }
        let by_group = self.store.running_group_counts().await?;
        let selected = select_fair(
            candidates,
            &by_group,
            queue.max_per_group,
            queue.max_threads - running,
        );

        for mut job in selected {
            let reservation = match self.running.reserve(
                &queue.name,
                job.id,
                &job.group_key,
                queue.max_threads,
                queue.max_per_group,
            ) {
                Ok(reservation) => reservation,
                Err(ReserveRejection::QueueFull) => {
                    tracing::debug!(queue = %queue.name, "queue filled during tick");
                    break;
                }
                Err(rejection) => {
                    tracing::debug!(
                        job_id = %job.id,
                        group = %job.group_key,
                        %rejection,
                        "job skipped"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            let start = Transition::Start {
                started_at_ms: now_ms,
            };
            match self.store.update_status(job.id, JobStatus::Waiting, start).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(job_id = %job.id, "job left Waiting before dispatch");
                    drop(reservation);
                    report.skipped += 1;
                    continue;
                }
                Err(err) => {
                    drop(reservation);
                    report.rolled_back += 1;
                    tracing::warn!(
                        job_id = %job.id,
                        queue = %queue.name,
                        error = %err,
                        "reservation rolled back"
                    );
                    emit(
                        self.events.as_ref(),
                        &job,
                        JobEventKind::RolledBack,
                        Some(err.to_string()),
                    );
                    return Err(err);
                }
            }

            start.apply(&mut job);
            tracing::debug!(
                job_id = %job.id,
                job_type = %job.job_type,
                queue = %queue.name,
                group = %job.group_key,
                "job dispatched"
            );
            emit(self.events.as_ref(), &job, JobEventKind::Started, None);
            report.dispatched.push(job.id);
            *report.per_queue.entry(queue.name.clone()).or_insert(0) += 1;

            let supervisor = ExecutionSupervisor::new(
                Arc::clone(&self.store),
                self.executor.clone(),
                RetryPolicy::from(queue),
                self.events.clone(),
                self.shutdown.clone(),
            );
            self.spawner.spawn(self.tracker.track_future(async move {
                supervisor.run(job, reservation).await;
            }));
        }
        Ok(())
    }

    /// Tick until `token` is cancelled, sleeping `interval` between ticks.
    pub async fn run(self: Arc<Self>, token: CancellationToken, interval: Duration) {
        tracing::info!(queues = self.config.queues.len(), ?interval, "dispatcher started");
        while !token.is_cancelled() {
            let report = self.tick(now_ms()).await;
            if !report.dispatched.is_empty() {
                tracing::debug!(
                    dispatched = report.dispatched.len(),
                    skipped = report.skipped,
                    "dispatch tick"
                );
            }
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        tracing::info!("dispatcher stopped");
    }
}
