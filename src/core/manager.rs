//! Administrative API over the job store.
//!
//! `JobManager` is what hosts call to enqueue work and to maintain recurring
//! definitions. It applies the key conventions (an explicit key is scoped by
//! job type, group keys default to the job type) and validates requests
//! against the engine configuration before touching the store.

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::core::events::{EventSink, JobEvent, JobEventKind};
use crate::core::job::{
    EnqueueRequest, JobInstance, NewJob, RecurringJobDefinition, RecurringJobRequest,
};
use crate::core::stagger::{least_used_slot, slot_count, staggered_run};
use crate::core::store::JobStore;
use crate::core::EngineError;
use crate::util::clock::now_ms;
use crate::util::serde::{new_id, DefinitionId, JobId};

/// Instance key for `job_type` and an optional caller key.
#[must_use]
pub fn instance_key(job_type: &str, key: Option<&str>) -> String {
    match key {
        Some(key) if !key.is_empty() => format!("{job_type}_{key}"),
        _ => job_type.to_string(),
    }
}

/// Entry point for enqueueing jobs and managing recurring definitions.
pub struct JobManager<St> {
    store: Arc<St>,
    config: Arc<EngineConfig>,
    events: Option<Arc<dyn EventSink>>,
}

impl<St> Clone for JobManager<St> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            events: self.events.clone(),
        }
    }
}

impl<St: JobStore> JobManager<St> {
    /// Manager over `store` using the queues of `config`.
    pub fn new(
        store: Arc<St>,
        config: Arc<EngineConfig>,
        events: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self { store, config, events }
    }

    /// Enqueue a job eligible immediately.
    ///
    /// If a live job with the same key exists its id is returned unchanged.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] for an empty job type,
    /// [`EngineError::UnknownQueue`] for an unconfigured queue, or a store error.
    pub async fn enqueue_job(&self, req: EnqueueRequest) -> Result<JobId, EngineError> {
        let now = now_ms();
        let job = self.new_job(req, now, now)?;
        let id = self.store.enqueue(job.clone()).await?;
        tracing::info!(
            job_id = %id,
            key = %job.key,
            queue = %job.queue,
            priority = ?job.priority,
            "job enqueued"
        );
        self.record_enqueued(id, &job, now);
        Ok(id)
    }

    /// Enqueue or reschedule a job to become eligible at `at_ms`.
    ///
    /// # Errors
    ///
    /// Same as [`JobManager::enqueue_job`].
    pub async fn schedule_job(
        &self,
        req: EnqueueRequest,
        at_ms: u128,
    ) -> Result<JobId, EngineError> {
        let now = now_ms();
        let job = self.new_job(req, now, at_ms)?;
        let id = self.store.schedule(job.clone()).await?;
        tracing::debug!(
            job_id = %id,
            key = %job.key,
            queue = %job.queue,
            scheduled_at_ms = %at_ms,
            "job scheduled"
        );
        self.record_enqueued(id, &job, now);
        Ok(id)
    }

    /// Create or update a recurring definition, keyed by `req.key` (the job
    /// type when absent).
    ///
    /// A new definition takes the least used stagger slot among enabled
    /// definitions of its job type and first runs on that slot: already due
    /// when `run_now` is set, otherwise at its next occurrence. An existing
    /// definition keeps its slot and next run unless its interval changed or
    /// it is being re-enabled.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] for an empty job type or a zero
    /// interval, or a store error.
    pub async fn schedule_recurring_job(
        &self,
        req: RecurringJobRequest,
    ) -> Result<DefinitionId, EngineError> {
        if req.job_type.trim().is_empty() {
            return Err(EngineError::InvalidRequest("job_type must not be empty".into()));
        }
        if req.interval.is_zero() {
            return Err(EngineError::InvalidRequest(
                "interval must be greater than zero".into(),
            ));
        }
        let key = req.key.clone().unwrap_or_else(|| req.job_type.clone());
        let group_key = req.group_key.clone().unwrap_or_else(|| req.job_type.clone());
        let now = now_ms();

        let def = match self.store.find_definition_by_key(&key).await? {
            None => {
                let slot = self.free_slot(&req.job_type, None, req.interval).await?;
                tracing::info!(key = %key, job_type = %req.job_type, slot, "added recurring job");
                RecurringJobDefinition {
                    id: new_id(),
                    job_type: req.job_type,
                    parameters: req.parameters,
                    key,
                    group_key,
                    interval: req.interval,
                    enabled: req.enabled,
                    priority: req.priority,
                    previous_run_ms: None,
                    next_run_ms: staggered_run(now, req.interval, slot, req.run_now),
                    stagger_slot: slot,
                }
            }
            Some(mut existing) => {
                let reschedule = existing.interval != req.interval
                    || (!existing.enabled && req.enabled);
                if reschedule {
                    existing.stagger_slot = self
                        .free_slot(&req.job_type, Some(existing.id), req.interval)
                        .await?;
                    existing.next_run_ms =
                        staggered_run(now, req.interval, existing.stagger_slot, req.run_now);
                }
                existing.job_type = req.job_type;
                existing.parameters = req.parameters;
                existing.group_key = group_key;
                existing.interval = req.interval;
                existing.enabled = req.enabled;
                existing.priority = req.priority;
                tracing::info!(key = %existing.key, reschedule, "updated recurring job");
                existing
            }
        };
        let id = def.id;
        self.store.save_definition(def).await?;
        Ok(id)
    }

    /// Change the interval of every recurring definition of `job_type`,
    /// returning how many were updated.
    ///
    /// Pending next runs are kept; the new interval applies from the next
    /// advance.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] for a zero interval, or a store error.
    pub async fn set_recurring_interval(
        &self,
        job_type: &str,
        interval: Duration,
    ) -> Result<usize, EngineError> {
        if interval.is_zero() {
            return Err(EngineError::InvalidRequest(
                "interval must be greater than zero".into(),
            ));
        }
        let updated = self.store.set_interval_by_type(job_type, interval).await?;
        tracing::info!(job_type, ?interval, updated, "recurring interval changed");
        Ok(updated)
    }

    /// Enabled flag of a definition, or `None` if no definition has this
    /// type and key.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn recurring_job_status(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<Option<bool>, EngineError> {
        Ok(self
            .store
            .find_definition_by_key(key)
            .await?
            .filter(|def| def.job_type == job_type)
            .map(|def| def.enabled))
    }

    /// Delete recurring definitions matching type and parameters.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn delete_recurring_job(
        &self,
        job_type: &str,
        parameters: &str,
    ) -> Result<bool, EngineError> {
        let removed = self
            .store
            .delete_definition_by_type_and_parameters(job_type, parameters)
            .await?;
        if removed {
            tracing::info!(job_type, "recurring job deleted");
        }
        Ok(removed)
    }

    /// Delete the recurring definition with this type and key.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn delete_recurring_job_by_key(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<bool, EngineError> {
        let removed = self.store.delete_definition_by_type_and_key(job_type, key).await?;
        if removed {
            tracing::info!(job_type, key, "recurring job deleted");
        }
        Ok(removed)
    }

    /// Enable a definition, returning its previous flag or `None` if absent.
    ///
    /// Re-enabling restarts the schedule one interval from now.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn enable_recurring_job(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<Option<bool>, EngineError> {
        self.set_enabled(job_type, key, true).await
    }

    /// Disable a definition, returning its previous flag or `None` if absent.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn disable_recurring_job(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<Option<bool>, EngineError> {
        self.set_enabled(job_type, key, false).await
    }

    async fn set_enabled(
        &self,
        job_type: &str,
        key: &str,
        enabled: bool,
    ) -> Result<Option<bool>, EngineError> {
        let Some(mut def) = self.store.find_definition_by_key(key).await? else {
            return Ok(None);
        };
        if def.job_type != job_type {
            return Ok(None);
        }
        let previous = def.enabled;
        if previous != enabled {
            if enabled {
                def.next_run_ms = staggered_run(now_ms(), def.interval, def.stagger_slot, false);
            }
            def.enabled = enabled;
            self.store.save_definition(def).await?;
            tracing::info!(job_type, key, enabled, "recurring job toggled");
        }
        Ok(Some(previous))
    }

    async fn free_slot(
        &self,
        job_type: &str,
        exclude: Option<DefinitionId>,
        interval: Duration,
    ) -> Result<u32, EngineError> {
        let used: Vec<u32> = self
            .store
            .definitions_by_type(job_type)
            .await?
            .into_iter()
            .filter(|def| def.enabled && Some(def.id) != exclude)
            .map(|def| def.stagger_slot)
            .collect();
        Ok(least_used_slot(&used, slot_count(interval)))
    }

    /// Recurring definitions of one job type.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn recurring_jobs_by_type(
        &self,
        job_type: &str,
    ) -> Result<Vec<RecurringJobDefinition>, EngineError> {
        self.store.definitions_by_type(job_type).await
    }

    /// Every recurring definition.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn recurring_jobs(&self) -> Result<Vec<RecurringJobDefinition>, EngineError> {
        self.store.all_definitions().await
    }

    /// Look up a job instance.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn job(&self, id: JobId) -> Result<Option<JobInstance>, EngineError> {
        self.store.get_job(id).await
    }

    /// Remove queued instances of `job_type` enqueued with caller key `key`,
    /// returning how many were removed. Running instances are kept.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn delete_queued_jobs(
        &self,
        job_type: &str,
        key: &str,
    ) -> Result<usize, EngineError> {
        let instance = instance_key(job_type, Some(key));
        let removed = self
            .store
            .delete_jobs_by_type_and_key(job_type, &instance)
            .await?;
        if removed > 0 {
            tracing::info!(job_type, key = %instance, removed, "queued jobs deleted");
        }
        Ok(removed)
    }

    /// Remove job instances, returning how many existed.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn delete_jobs(&self, ids: &[JobId]) -> Result<usize, EngineError> {
        self.store.delete_jobs(ids).await
    }

    fn new_job(
        &self,
        req: EnqueueRequest,
        now: u128,
        scheduled_at_ms: u128,
    ) -> Result<NewJob, EngineError> {
        if req.job_type.trim().is_empty() {
            return Err(EngineError::InvalidRequest("job_type must not be empty".into()));
        }
        let queue = req.queue.unwrap_or_else(|| self.config.default_queue.clone());
        if self.config.queue(&queue).is_none() {
            return Err(EngineError::UnknownQueue(queue));
        }
        Ok(NewJob {
            key: instance_key(&req.job_type, req.key.as_deref()),
            group_key: req.group_key.unwrap_or_else(|| req.job_type.clone()),
            job_type: req.job_type,
            parameters: req.parameters,
            queue,
            priority: req.priority,
            enqueued_at_ms: now,
            scheduled_at_ms,
        })
    }

    fn record_enqueued(&self, id: JobId, job: &NewJob, now: u128) {
        if let Some(sink) = &self.events {
            sink.record(JobEvent {
                job_id: id,
                job_type: job.job_type.clone(),
                queue: job.queue.clone(),
                kind: JobEventKind::Enqueued,
                at_ms: now,
                detail: Some(job.key.clone()),
            });
        }
    }
}
