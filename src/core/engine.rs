//! Engine composition and lifecycle.
//!
//! [`JobEngine`] wires the store, executor and spawner into a dispatcher and
//! a recurring scheduler that share one [`RunningSet`] and one cancellation
//! token. Both loops and every job execution are spawned through the injected
//! [`Spawn`], so they all land on the same runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::EngineConfig;
use crate::core::dispatcher::{DispatchReport, QueueDispatcher};
use crate::core::events::EventSink;
use crate::core::executor::JobExecutor;
use crate::core::manager::JobManager;
use crate::core::recurring::{RecurringScheduler, RecurringTickReport};
use crate::core::running::{RunningSet, RunningSnapshot};
use crate::core::spawn::Spawn;
use crate::core::store::JobStore;
use crate::core::EngineError;

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Whether the background loops are running.
    pub started: bool,
    /// Jobs holding a slot.
    pub running: usize,
    /// Supervisor tasks not yet finished.
    pub in_flight: usize,
    /// Per-queue and per-group running counts.
    pub snapshot: RunningSnapshot,
}

/// The assembled job engine.
pub struct JobEngine<St, E, S> {
    config: Arc<EngineConfig>,
    store: Arc<St>,
    spawner: S,
    events: Option<Arc<dyn EventSink>>,
    running: Arc<RunningSet>,
    tracker: TaskTracker,
    loops: TaskTracker,
    token: CancellationToken,
    dispatcher: Arc<QueueDispatcher<St, E, S>>,
    recurring: Arc<RecurringScheduler<St>>,
    manager: JobManager<St>,
    started: AtomicBool,
}

impl<St, E, S> JobEngine<St, E, S>
where
    St: JobStore,
    E: JobExecutor,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Assemble an engine. The configuration is assumed valid; use
    /// [`crate::builders::EngineBuilder`] to validate first.
    pub fn new(config: EngineConfig, store: Arc<St>, executor: E, spawner: S) -> Self {
        Self::with_event_sink(config, store, executor, spawner, None)
    }

    /// Like [`JobEngine::new`], reporting lifecycle events to `events`.
    pub fn with_event_sink(
        config: EngineConfig,
        store: Arc<St>,
        executor: E,
        spawner: S,
        events: Option<Arc<dyn EventSink>>,
    ) -> Self {
        let config = Arc::new(config);
        let running = Arc::new(RunningSet::new());
        let tracker = TaskTracker::new();
        let token = CancellationToken::new();
        let dispatcher = Arc::new(QueueDispatcher::new(
            Arc::clone(&config),
            Arc::clone(&store),
            executor,
            spawner.clone(),
            Arc::clone(&running),
            tracker.clone(),
            events.clone(),
            token.clone(),
        ));
        let recurring = Arc::new(RecurringScheduler::new(
            Arc::clone(&store),
            config.default_queue.clone(),
            events.clone(),
        ));
        let manager = JobManager::new(Arc::clone(&store), Arc::clone(&config), events.clone());
        Self {
            config,
            store,
            spawner,
            events,
            running,
            tracker,
            loops: TaskTracker::new(),
            token,
            dispatcher,
            recurring,
            manager,
            started: AtomicBool::new(false),
        }
    }

    /// Administrative API handle.
    #[must_use]
    pub fn manager(&self) -> JobManager<St> {
        self.manager.clone()
    }

    /// Shared running set.
    #[must_use]
    pub fn running(&self) -> Arc<RunningSet> {
        Arc::clone(&self.running)
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token cancelled by [`JobEngine::shutdown`].
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Recover interrupted jobs and start both background loops.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyStarted`] on a second call, or the store error
    /// raised while resetting Running jobs.
    pub async fn start(&self) -> Result<(), EngineError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyStarted);
        }

        let recovered = match self.store.reset_running().await {
            Ok(n) => n,
            Err(err) => {
                self.started.store(false, Ordering::Release);
                return Err(err);
            }
        };
        if recovered > 0 {
            tracing::warn!(recovered, "interrupted jobs returned to Waiting");
        }

        let dispatcher = Arc::clone(&self.dispatcher)
            .run(self.token.clone(), self.config.dispatcher_poll_interval());
        let recurring = Arc::clone(&self.recurring)
            .run(self.token.clone(), self.config.recurring_poll_interval());
        self.spawner.spawn(self.loops.track_future(dispatcher));
        self.spawner.spawn(self.loops.track_future(recurring));
        tracing::info!(queues = self.config.queues.len(), "job engine started");
        Ok(())
    }

    /// Run one dispatcher pass at `now_ms`.
    pub async fn dispatch_tick(&self, now_ms: u128) -> DispatchReport {
        self.dispatcher.tick(now_ms).await
    }

    /// Run one recurring scheduler pass at `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns the store error raised while loading due definitions.
    pub async fn recurring_tick(&self, now_ms: u128) -> Result<RecurringTickReport, EngineError> {
        self.recurring.tick(now_ms).await
    }

    /// Stop both loops and wait for in-flight jobs within the grace period.
    ///
    /// Jobs still running when the grace period ends are left to finish on
    /// their own; their slots are released when they do.
    ///
    /// # Errors
    ///
    /// [`EngineError::GraceExceeded`] when jobs are still running.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.token.cancel();
        self.loops.close();
        self.loops.wait().await;

        self.tracker.close();
        let grace = self.config.shutdown_grace();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            let still_running = self.tracker.len();
            tracing::warn!(still_running, ?grace, "shutdown grace exceeded");
            return Err(EngineError::GraceExceeded { still_running });
        }
        tracing::info!("job engine stopped");
        Ok(())
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            started: self.started.load(Ordering::Acquire),
            running: self.running.total(),
            in_flight: self.tracker.len(),
            snapshot: self.running.snapshot(),
        }
    }

    /// Whether lifecycle events are being reported.
    #[must_use]
    pub fn has_event_sink(&self) -> bool {
        self.events.is_some()
    }
}
