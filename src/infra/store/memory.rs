//! In-memory job store for tests, demos and single-process hosts.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::job::{JobInstance, JobStatus, NewJob, RecurringJobDefinition, Transition};
use crate::core::store::JobStore;
use crate::core::EngineError;
use crate::util::serde::{new_id, DefinitionId, JobId};

#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<JobId, JobInstance>,
    keys: HashMap<String, JobId>,
    definitions: HashMap<DefinitionId, RecurringJobDefinition>,
}

impl StoreState {
    fn insert(&mut self, job: NewJob) -> JobId {
        let id = new_id();
        self.keys.insert(job.key.clone(), id);
        self.jobs.insert(id, job.into_instance(id));
        id
    }

    fn rearm(&mut self, id: JobId, job: NewJob) {
        self.jobs.insert(id, job.into_instance(id));
    }
}

/// Job store kept entirely in process memory behind one mutex.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
}

impl InMemoryJobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job instance.
    #[must_use]
    pub fn jobs(&self) -> Vec<JobInstance> {
        self.state.lock().jobs.values().cloned().collect()
    }

    /// Number of jobs with `status`.
    #[must_use]
    pub fn count_status(&self, status: JobStatus) -> usize {
        self.state
            .lock()
            .jobs
            .values()
            .filter(|job| job.status == status)
            .count()
    }

    /// Insert an instance as-is, replacing any job with the same id.
    pub fn insert_job(&self, job: JobInstance) {
        let mut state = self.state.lock();
        state.keys.insert(job.key.clone(), job.id);
        state.jobs.insert(job.id, job);
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, EngineError> {
        let mut state = self.state.lock();
        let existing = state
            .keys
            .get(&job.key)
            .and_then(|id| state.jobs.get(id))
            .map(|current| (current.id, current.status));
        match existing {
            Some((id, status)) if !status.is_terminal() => Ok(id),
            Some((id, _)) => {
                state.rearm(id, job);
                Ok(id)
            }
            None => Ok(state.insert(job)),
        }
    }

    async fn schedule(&self, job: NewJob) -> Result<JobId, EngineError> {
        let mut state = self.state.lock();
        let existing = state
            .keys
            .get(&job.key)
            .and_then(|id| state.jobs.get(id))
            .map(|current| (current.id, current.status));
        match existing {
            Some((id, JobStatus::Running)) => Ok(id),
            Some((id, _)) => {
                state.rearm(id, job);
                Ok(id)
            }
            None => Ok(state.insert(job)),
        }
    }

    async fn query_waiting(
        &self,
        queue: &str,
        now_ms: u128,
    ) -> Result<Vec<JobInstance>, EngineError> {
        let state = self.state.lock();
        let mut waiting: Vec<JobInstance> = state
            .jobs
            .values()
            .filter(|job| {
                job.queue == queue
                    && job.status == JobStatus::Waiting
                    && job.scheduled_at_ms <= now_ms
            })
            .cloned()
            .collect();
        waiting.sort_by(|a, b| {
            a.scheduled_at_ms
                .cmp(&b.scheduled_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(waiting)
    }

    async fn running_group_counts(&self) -> Result<HashMap<String, usize>, EngineError> {
        let state = self.state.lock();
        let mut counts = HashMap::new();
        for job in state.jobs.values().filter(|job| job.status == JobStatus::Running) {
            *counts.entry(job.group_key.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn update_status(
        &self,
        id: JobId,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<bool, EngineError> {
        let mut state = self.state.lock();
        match state.jobs.get_mut(&id) {
            Some(job) if job.status == expected => {
                transition.apply(job);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobInstance>, EngineError> {
        Ok(self.state.lock().jobs.get(&id).cloned())
    }

    async fn delete_jobs(&self, ids: &[JobId]) -> Result<usize, EngineError> {
        let mut state = self.state.lock();
        let mut removed = 0;
        for id in ids {
            if let Some(job) = state.jobs.remove(id) {
                if state.keys.get(&job.key) == Some(id) {
                    state.keys.remove(&job.key);
                }
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_jobs_by_type_and_key(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<usize, EngineError> {
        let mut state = self.state.lock();
        let ids: Vec<JobId> = state
            .jobs
            .values()
            .filter(|job| {
                job.job_type == job_type && job.key == key && job.status != JobStatus::Running
            })
            .map(|job| job.id)
            .collect();
        for id in &ids {
            state.jobs.remove(id);
            if state.keys.get(key) == Some(id) {
                state.keys.remove(key);
            }
        }
        Ok(ids.len())
    }

    async fn reset_running(&self) -> Result<usize, EngineError> {
        let mut state = self.state.lock();
        let mut reset = 0;
        for job in state.jobs.values_mut().filter(|job| job.status == JobStatus::Running) {
            job.status = JobStatus::Waiting;
            reset += 1;
        }
        Ok(reset)
    }

    async fn load_due_definitions(
        &self,
        now_ms: u128,
    ) -> Result<Vec<RecurringJobDefinition>, EngineError> {
        let state = self.state.lock();
        let mut due: Vec<RecurringJobDefinition> = state
            .definitions
            .values()
            .filter(|def| def.enabled && def.next_run_ms <= now_ms)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_run_ms.cmp(&b.next_run_ms).then_with(|| a.key.cmp(&b.key)));
        Ok(due)
    }

    async fn save_definition(&self, def: RecurringJobDefinition) -> Result<(), EngineError> {
        self.state.lock().definitions.insert(def.id, def);
        Ok(())
    }

    async fn find_definition_by_key(
        &self,
        key: &str,
    ) -> Result<Option<RecurringJobDefinition>, EngineError> {
        Ok(self
            .state
            .lock()
            .definitions
            .values()
            .find(|def| def.key == key)
            .cloned())
    }

    async fn definitions_by_type(
        &self,
        job_type: &str,
    ) -> Result<Vec<RecurringJobDefinition>, EngineError> {
        let state = self.state.lock();
        let mut defs: Vec<RecurringJobDefinition> = state
            .definitions
            .values()
            .filter(|def| def.job_type == job_type)
            .cloned()
            .collect();
        defs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(defs)
    }

    async fn set_interval_by_type(
        &self,
        job_type: &str,
        interval: Duration,
    ) -> Result<usize, EngineError> {
        let mut state = self.state.lock();
        let mut updated = 0;
        for def in state
            .definitions
            .values_mut()
            .filter(|def| def.job_type == job_type)
        {
            def.interval = interval;
            updated += 1;
        }
        Ok(updated)
    }

    async fn all_definitions(&self) -> Result<Vec<RecurringJobDefinition>, EngineError> {
        let mut defs: Vec<RecurringJobDefinition> =
            self.state.lock().definitions.values().cloned().collect();
        defs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(defs)
    }

    async fn delete_definition_by_type_and_parameters(
        &self,
        job_type: &str,
        parameters: &str,
    ) -> Result<bool, EngineError> {
        let mut state = self.state.lock();
        let before = state.definitions.len();
        state
            .definitions
            .retain(|_, def| !(def.job_type == job_type && def.parameters == parameters));
        Ok(state.definitions.len() != before)
    }

    async fn delete_definition_by_type_and_key(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<bool, EngineError> {
        let mut state = self.state.lock();
        let before = state.definitions.len();
        state
            .definitions
            .retain(|_, def| !(def.job_type == job_type && def.key == key));
        Ok(state.definitions.len() != before)
    }
}
