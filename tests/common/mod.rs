//! Shared fixtures for integration tests: a scripted executor, a store
//! wrapper with failure injection and engine helpers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus_job_engine::builders::EngineBuilder;
use prometheus_job_engine::config::{EngineConfig, QueueConfig};
use prometheus_job_engine::core::{
    AppResult, EngineError, InMemoryEventSink, JobContext, JobEngine, JobExecutor, JobInstance,
    JobOutcome, JobStatus, JobStore, NewJob, RecurringJobDefinition, Transition,
};
use prometheus_job_engine::infra::InMemoryJobStore;
use prometheus_job_engine::runtime::TokioSpawner;
use prometheus_job_engine::util::serde::JobId;
use tokio_util::sync::CancellationToken;

pub type TestEngine = JobEngine<FlakyStore, ScriptedExecutor, TokioSpawner>;

/// Executor whose behavior is chosen by the job parameters:
/// `fail`, `error`, `panic`, `handled`, `delete`, `hold` (until the gate
/// opens), `await_shutdown`, `sleep:<ms>`; anything else succeeds.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    inner: Arc<ExecutorState>,
}

#[derive(Default)]
struct ExecutorState {
    calls: Mutex<Vec<JobContext>>,
    active: Mutex<Counters>,
    gate: CancellationToken,
}

#[derive(Default)]
struct Counters {
    total: usize,
    peak_total: usize,
    by_group: HashMap<String, usize>,
    peak_by_group: HashMap<String, usize>,
    by_queue: HashMap<String, usize>,
    peak_by_queue: HashMap<String, usize>,
}

struct ActiveGuard {
    state: Arc<ExecutorState>,
    group: String,
    queue: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.state.active.lock();
        active.total -= 1;
        *active.by_group.entry(self.group.clone()).or_insert(1) -= 1;
        *active.by_queue.entry(self.queue.clone()).or_insert(1) -= 1;
    }
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let every `hold` job finish.
    pub fn open_gate(&self) {
        self.inner.gate.cancel();
    }

    pub fn calls(&self) -> Vec<JobContext> {
        self.inner.calls.lock().clone()
    }

    pub fn calls_for(&self, id: JobId) -> usize {
        self.inner.calls.lock().iter().filter(|c| c.job_id == id).count()
    }

    pub fn peak_total(&self) -> usize {
        self.inner.active.lock().peak_total
    }

    pub fn peak_by_group(&self) -> HashMap<String, usize> {
        self.inner.active.lock().peak_by_group.clone()
    }

    pub fn peak_by_queue(&self) -> HashMap<String, usize> {
        self.inner.active.lock().peak_by_queue.clone()
    }

    fn enter(&self, ctx: &JobContext) -> ActiveGuard {
        let mut active = self.inner.active.lock();
        active.total += 1;
        active.peak_total = active.peak_total.max(active.total);
        let group = active.by_group.entry(ctx.group_key.clone()).or_insert(0);
        *group += 1;
        let group_now = *group;
        let peak = active.peak_by_group.entry(ctx.group_key.clone()).or_insert(0);
        *peak = (*peak).max(group_now);
        let queue = active.by_queue.entry(ctx.queue.clone()).or_insert(0);
        *queue += 1;
        let queue_now = *queue;
        let peak = active.peak_by_queue.entry(ctx.queue.clone()).or_insert(0);
        *peak = (*peak).max(queue_now);
        ActiveGuard {
            state: Arc::clone(&self.inner),
            group: ctx.group_key.clone(),
            queue: ctx.queue.clone(),
        }
    }
}

#[async_trait]
impl JobExecutor for ScriptedExecutor {
    async fn execute(&self, ctx: JobContext) -> AppResult<JobOutcome> {
        self.inner.calls.lock().push(ctx.clone());
        let _active = self.enter(&ctx);
        let behavior = ctx.parameters.as_str();
        match behavior {
            "fail" => Ok(JobOutcome::Failed),
            "error" => Err(anyhow!("scripted error")),
            "panic" => panic!("scripted panic"),
            "handled" => Ok(JobOutcome::Handled),
            "delete" => Ok(JobOutcome::Delete),
            "hold" => {
                self.inner.gate.cancelled().await;
                Ok(JobOutcome::Success)
            }
            "await_shutdown" => {
                ctx.shutdown.cancelled().await;
                Ok(JobOutcome::Success)
            }
            other => {
                if let Some(ms) = other.strip_prefix("sleep:") {
                    let ms: u64 = ms.parse()?;
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                Ok(JobOutcome::Success)
            }
        }
    }
}

/// In-memory store with switchable failures.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryJobStore,
    fail_start: AtomicBool,
    fail_query: AtomicBool,
    fail_enqueue_keys: Mutex<HashSet<String>>,
    start_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make Waiting to Running updates fail.
    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make waiting-job queries fail.
    pub fn fail_query(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::SeqCst);
    }

    /// Make enqueues with this key fail.
    pub fn fail_enqueue_for(&self, key: &str) {
        self.fail_enqueue_keys.lock().insert(key.to_string());
    }

    pub fn start_attempts(&self) -> usize {
        self.start_attempts.load(Ordering::SeqCst)
    }
}

fn injected(what: &str) -> EngineError {
    EngineError::Store(format!("injected {what} failure"))
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, EngineError> {
        if self.fail_enqueue_keys.lock().contains(&job.key) {
            return Err(injected("enqueue"));
        }
        self.inner.enqueue(job).await
    }

    async fn schedule(&self, job: NewJob) -> Result<JobId, EngineError> {
        self.inner.schedule(job).await
    }

    async fn query_waiting(
        &self,
        queue: &str,
        now_ms: u128,
    ) -> Result<Vec<JobInstance>, EngineError> {
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(injected("query"));
        }
        self.inner.query_waiting(queue, now_ms).await
    }

    async fn running_group_counts(&self) -> Result<HashMap<String, usize>, EngineError> {
        self.inner.running_group_counts().await
    }

    async fn update_status(
        &self,
        id: JobId,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<bool, EngineError> {
        if let Transition::Start { .. } = transition {
            self.start_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(injected("start"));
            }
        }
        self.inner.update_status(id, expected, transition).await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobInstance>, EngineError> {
        self.inner.get_job(id).await
    }

    async fn delete_jobs(&self, ids: &[JobId]) -> Result<usize, EngineError> {
        self.inner.delete_jobs(ids).await
    }

    async fn delete_jobs_by_type_and_key(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<usize, EngineError> {
        self.inner.delete_jobs_by_type_and_key(job_type, key).await
    }

    async fn reset_running(&self) -> Result<usize, EngineError> {
        self.inner.reset_running().await
    }

    async fn load_due_definitions(
        &self,
        now_ms: u128,
    ) -> Result<Vec<RecurringJobDefinition>, EngineError> {
        self.inner.load_due_definitions(now_ms).await
    }

    async fn save_definition(&self, def: RecurringJobDefinition) -> Result<(), EngineError> {
        self.inner.save_definition(def).await
    }

    async fn find_definition_by_key(
        &self,
        key: &str,
    ) -> Result<Option<RecurringJobDefinition>, EngineError> {
        self.inner.find_definition_by_key(key).await
    }

    async fn definitions_by_type(
        &self,
        job_type: &str,
    ) -> Result<Vec<RecurringJobDefinition>, EngineError> {
        self.inner.definitions_by_type(job_type).await
    }

    async fn set_interval_by_type(
        &self,
        job_type: &str,
        interval: Duration,
    ) -> Result<usize, EngineError> {
        self.inner.set_interval_by_type(job_type, interval).await
    }

    async fn all_definitions(&self) -> Result<Vec<RecurringJobDefinition>, EngineError> {
        self.inner.all_definitions().await
    }

    async fn delete_definition_by_type_and_parameters(
        &self,
        job_type: &str,
        parameters: &str,
    ) -> Result<bool, EngineError> {
        self.inner
            .delete_definition_by_type_and_parameters(job_type, parameters)
            .await
    }

    async fn delete_definition_by_type_and_key(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<bool, EngineError> {
        self.inner.delete_definition_by_type_and_key(job_type, key).await
    }
}

pub struct Harness {
    pub engine: TestEngine,
    pub store: Arc<FlakyStore>,
    pub executor: ScriptedExecutor,
    pub events: InMemoryEventSink,
}

pub fn single_queue(max_threads: usize, max_per_group: usize) -> EngineConfig {
    EngineConfig::with_queues(vec![QueueConfig::new("default")
        .with_max_threads(max_threads)
        .with_max_per_group(max_per_group)
        .with_retry_backoff_secs(0)])
    .with_poll_intervals(10, 10)
}

pub fn harness(config: EngineConfig) -> Harness {
    let store = Arc::new(FlakyStore::new());
    let executor = ScriptedExecutor::new();
    let events = InMemoryEventSink::new(1_000);
    let engine = EngineBuilder::new(config)
        .with_events(Arc::new(events.clone()))
        .build(
            Arc::clone(&store),
            executor.clone(),
            TokioSpawner::current().expect("inside a tokio runtime"),
        )
        .expect("valid config");
    Harness {
        engine,
        store,
        executor,
        events,
    }
}

/// Wait until no job holds a slot and every supervisor task has finished.
pub async fn wait_idle(engine: &TestEngine) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let stats = engine.stats();
            if stats.running == 0 && stats.in_flight == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("engine did not become idle");
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn status_of(store: &FlakyStore, id: JobId) -> Option<JobStatus> {
    store.inner.jobs().into_iter().find(|j| j.id == id).map(|j| j.status)
}

pub fn job_of(store: &FlakyStore, id: JobId) -> JobInstance {
    store
        .inner
        .jobs()
        .into_iter()
        .find(|j| j.id == id)
        .expect("job exists")
}
