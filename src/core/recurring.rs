//! Recurring scheduler loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::events::{EventSink, JobEvent, JobEventKind};
use crate::core::job::{NewJob, RecurringJobDefinition};
use crate::core::store::JobStore;
use crate::core::EngineError;
use crate::util::clock::now_ms;

/// What a recurring tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecurringTickReport {
    /// Definitions that produced an instance and were advanced.
    pub enqueued: usize,
    /// Definitions whose enqueue or save failed.
    pub failed: usize,
}

/// Smallest whole-interval advance of `next_run_ms` that lands after `now_ms`.
///
/// A zero interval yields `now_ms + 1`.
#[must_use]
pub fn advance_next_run(next_run_ms: u128, interval: Duration, now_ms: u128) -> u128 {
    let step = interval.as_millis();
    if step == 0 {
        return now_ms.saturating_add(1);
    }
    if next_run_ms > now_ms {
        return next_run_ms;
    }
    let missed = (now_ms - next_run_ms) / step + 1;
    next_run_ms.saturating_add(missed.saturating_mul(step))
}

/// Turns due recurring definitions into job instances.
pub struct RecurringScheduler<St> {
    store: Arc<St>,
    default_queue: String,
    events: Option<Arc<dyn EventSink>>,
}

impl<St: JobStore> RecurringScheduler<St> {
    /// Scheduler enqueuing into `default_queue`.
    pub fn new(
        store: Arc<St>,
        default_queue: impl Into<String>,
        events: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            store,
            default_queue: default_queue.into(),
            events,
        }
    }

    /// Enqueue one instance per due definition and advance each past `now_ms`.
    ///
    /// # Errors
    ///
    /// Fails only when the due definitions cannot be loaded. Per-definition
    /// failures are logged and counted in the report.
    pub async fn tick(&self, now_ms: u128) -> Result<RecurringTickReport, EngineError> {
        let due = self.store.load_due_definitions(now_ms).await?;
        let mut report = RecurringTickReport::default();
        for def in due {
            let key = def.key.clone();
            match self.fire(def, now_ms).await {
                Ok(()) => report.enqueued += 1,
                Err(err) => {
                    tracing::error!(key = %key, error = %err, "recurring job not enqueued");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn fire(&self, mut def: RecurringJobDefinition, now_ms: u128) -> Result<(), EngineError> {
        let id = self
            .store
            .enqueue(NewJob::from_definition(&def, &self.default_queue, now_ms))
            .await?;
        if let Some(sink) = &self.events {
            sink.record(JobEvent {
                job_id: id,
                job_type: def.job_type.clone(),
                queue: self.default_queue.clone(),
                kind: JobEventKind::Enqueued,
                at_ms: now_ms,
                detail: Some(def.key.clone()),
            });
        }

        if def.interval.is_zero() {
            tracing::warn!(key = %def.key, "recurring job has a zero interval");
        }
        def.previous_run_ms = Some(def.next_run_ms);
        def.next_run_ms = advance_next_run(def.next_run_ms, def.interval, now_ms);
        tracing::info!(
            key = %def.key,
            job_id = %id,
            next_run_ms = %def.next_run_ms,
            "recurring job enqueued"
        );
        self.store.save_definition(def).await
    }

    /// Tick until `token` is cancelled, sleeping `interval` between ticks.
    pub async fn run(self: Arc<Self>, token: CancellationToken, interval: Duration) {
        tracing::info!(?interval, "recurring scheduler started");
        while !token.is_cancelled() {
            if let Err(err) = self.tick(now_ms()).await {
                tracing::error!(error = %err, "recurring tick failed");
            }
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }
        tracing::info!("recurring scheduler stopped");
    }
}
