//! Job data model: instances, recurring definitions, transitions and requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::serde::{DefinitionId, JobId, Priority};

/// Status of a job instance in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued and eligible once its scheduled time has passed.
    Waiting,
    /// Reserved by the dispatcher and handed to the supervisor.
    Running,
    /// Finished successfully.
    Completed,
    /// Exhausted its retries.
    Failed,
}

impl JobStatus {
    /// Whether the status is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One concrete unit of dispatchable work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    /// Unique job identifier.
    pub id: JobId,
    /// Job-type tag used to route execution.
    pub job_type: String,
    /// Opaque parameters, never interpreted by the engine.
    pub parameters: String,
    /// De-duplication key.
    pub key: String,
    /// Fairness partition, shared across queues.
    pub group_key: String,
    /// Target queue name.
    pub queue: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Current status.
    pub status: JobStatus,
    /// When the job was (re-)enqueued.
    pub enqueued_at_ms: u128,
    /// When the current or last run started.
    pub started_at_ms: Option<u128>,
    /// Earliest time the job may be dispatched.
    pub scheduled_at_ms: u128,
    /// When the job reached a terminal status.
    pub finished_at_ms: Option<u128>,
    /// Failed attempts so far.
    pub retry_count: u32,
}

/// Template for work that repeats on an interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringJobDefinition {
    /// Unique definition identifier.
    pub id: DefinitionId,
    /// Job-type tag of spawned instances.
    pub job_type: String,
    /// Opaque parameters copied verbatim into each instance.
    pub parameters: String,
    /// De-duplication key of spawned instances.
    pub key: String,
    /// Fairness partition of spawned instances.
    pub group_key: String,
    /// Time between runs.
    pub interval: Duration,
    /// Disabled definitions are never polled.
    pub enabled: bool,
    /// Priority of spawned instances.
    pub priority: Priority,
    /// The run time that last produced an instance.
    pub previous_run_ms: Option<u128>,
    /// Next time an instance is due.
    pub next_run_ms: u128,
    /// Minute offset inside the interval shared with same-type definitions.
    #[serde(default)]
    pub stagger_slot: u32,
}

/// Fields of a job about to be written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    /// Job-type tag.
    pub job_type: String,
    /// Opaque parameters.
    pub parameters: String,
    /// De-duplication key.
    pub key: String,
    /// Fairness partition.
    pub group_key: String,
    /// Target queue.
    pub queue: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Enqueue time.
    pub enqueued_at_ms: u128,
    /// Earliest dispatch time.
    pub scheduled_at_ms: u128,
}

impl NewJob {
    /// Build a fresh Waiting instance with the given id.
    #[must_use]
    pub fn into_instance(self, id: JobId) -> JobInstance {
        JobInstance {
            id,
            job_type: self.job_type,
            parameters: self.parameters,
            key: self.key,
            group_key: self.group_key,
            queue: self.queue,
            priority: self.priority,
            status: JobStatus::Waiting,
            enqueued_at_ms: self.enqueued_at_ms,
            started_at_ms: None,
            scheduled_at_ms: self.scheduled_at_ms,
            finished_at_ms: None,
            retry_count: 0,
        }
    }

    /// Derive the instance a recurring definition spawns, carried verbatim.
    #[must_use]
    pub fn from_definition(def: &RecurringJobDefinition, queue: &str, now_ms: u128) -> Self {
        Self {
            job_type: def.job_type.clone(),
            parameters: def.parameters.clone(),
            key: def.key.clone(),
            group_key: def.group_key.clone(),
            queue: queue.to_string(),
            priority: def.priority,
            enqueued_at_ms: now_ms,
            scheduled_at_ms: now_ms,
        }
    }
}

/// A conditional status change applied by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Waiting to Running.
    Start {
        /// Start time.
        started_at_ms: u128,
    },
    /// Running to Completed.
    Complete {
        /// Finish time.
        finished_at_ms: u128,
    },
    /// Running to Waiting with a delayed re-eligibility.
    Retry {
        /// Next eligible dispatch time.
        scheduled_at_ms: u128,
        /// Failed attempts including this one.
        retry_count: u32,
    },
    /// Running to Failed, retries exhausted.
    Fail {
        /// Finish time.
        finished_at_ms: u128,
        /// Failed attempts including this one.
        retry_count: u32,
    },
}

impl Transition {
    /// Status the job holds after the transition.
    #[must_use]
    pub const fn target(self) -> JobStatus {
        match self {
            Self::Start { .. } => JobStatus::Running,
            Self::Complete { .. } => JobStatus::Completed,
            Self::Retry { .. } => JobStatus::Waiting,
            Self::Fail { .. } => JobStatus::Failed,
        }
    }

    /// Apply the transition's fields to an instance.
    pub fn apply(self, job: &mut JobInstance) {
        job.status = self.target();
        match self {
            Self::Start { started_at_ms } => {
                job.started_at_ms = Some(started_at_ms);
                job.finished_at_ms = None;
            }
            Self::Complete { finished_at_ms } => {
                job.finished_at_ms = Some(finished_at_ms);
            }
            Self::Retry {
                scheduled_at_ms,
                retry_count,
            } => {
                job.scheduled_at_ms = scheduled_at_ms;
                job.retry_count = retry_count;
            }
            Self::Fail {
                finished_at_ms,
                retry_count,
            } => {
                job.finished_at_ms = Some(finished_at_ms);
                job.retry_count = retry_count;
            }
        }
    }
}

/// Terminal outcome reported by a job executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// The job finished; mark it Completed.
    Success,
    /// The job failed; apply the retry policy.
    Failed,
    /// The executor took responsibility for the job's state; leave it alone.
    Handled,
    /// Complete the job and delete its recurring definition.
    Delete,
}

/// Ad hoc enqueue request from the administrative layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Job-type tag.
    pub job_type: String,
    /// Opaque parameters.
    pub parameters: String,
    /// Dispatch priority.
    #[serde(default)]
    pub priority: Priority,
    /// Optional de-duplication key, scoped by job type.
    pub key: Option<String>,
    /// Optional fairness partition; defaults to the job type.
    pub group_key: Option<String>,
    /// Optional target queue; defaults to the engine's default queue.
    pub queue: Option<String>,
}

impl EnqueueRequest {
    /// Request for `job_type` with the given parameters and defaults elsewhere.
    pub fn new(job_type: impl Into<String>, parameters: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            parameters: parameters.into(),
            ..Self::default()
        }
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the de-duplication key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the group key.
    #[must_use]
    pub fn with_group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    /// Set the target queue.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }
}

/// Request to create or update a recurring job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringJobRequest {
    /// Job-type tag.
    pub job_type: String,
    /// Opaque parameters.
    pub parameters: String,
    /// De-duplication key; defaults to the job type.
    pub key: Option<String>,
    /// Fairness partition; defaults to the job type.
    pub group_key: Option<String>,
    /// Whether the definition is polled.
    pub enabled: bool,
    /// Time between runs.
    pub interval: Duration,
    /// Priority of spawned instances.
    pub priority: Priority,
    /// Make the first run due immediately instead of one interval from now.
    pub run_now: bool,
}

impl RecurringJobRequest {
    /// Enabled request repeating every `interval`, first run one interval out.
    pub fn new(
        job_type: impl Into<String>,
        parameters: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            job_type: job_type.into(),
            parameters: parameters.into(),
            key: None,
            group_key: None,
            enabled: true,
            interval,
            priority: Priority::Normal,
            run_now: false,
        }
    }

    /// Set the de-duplication key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the group key.
    #[must_use]
    pub fn with_group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Make the first run due immediately.
    #[must_use]
    pub const fn run_now(mut self) -> Self {
        self.run_now = true;
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
