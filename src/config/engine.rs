//! Engine and queue configuration structures.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "JOB_ENGINE_CONFIG";
/// Environment override for the dispatcher poll interval (milliseconds).
pub const DISPATCHER_POLL_ENV: &str = "JOB_ENGINE_DISPATCHER_POLL_MS";
/// Environment override for the recurring poll interval (milliseconds).
pub const RECURRING_POLL_ENV: &str = "JOB_ENGINE_RECURRING_POLL_MS";

/// Static per-queue limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name.
    pub name: String,
    /// Maximum concurrently running jobs in this queue.
    pub max_threads: usize,
    /// Maximum concurrently running jobs sharing a group key, counted across
    /// every queue.
    pub max_per_group: usize,
    /// Failed attempts after which a job becomes terminally Failed.
    pub max_retries: u32,
    /// Delay before a failed job becomes eligible again, in seconds.
    pub retry_backoff_secs: u64,
}

impl QueueConfig {
    /// Queue with the default limits.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_threads: 10,
            max_per_group: 3,
            max_retries: 150,
            retry_backoff_secs: 300,
        }
    }

    /// Set the queue concurrency cap.
    #[must_use]
    pub const fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the per-group cap.
    #[must_use]
    pub const fn with_max_per_group(mut self, max_per_group: usize) -> Self {
        self.max_per_group = max_per_group;
        self
    }

    /// Set the retry limit.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the retry backoff in seconds.
    #[must_use]
    pub const fn with_retry_backoff_secs(mut self, secs: u64) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    /// Retry backoff as a duration.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    /// Validate queue limits.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("queue name must not be empty".into());
        }
        if self.max_threads == 0 {
            return Err("max_threads must be greater than 0".into());
        }
        if self.max_per_group == 0 {
            return Err("max_per_group must be greater than 0".into());
        }
        if self.max_retries == 0 {
            return Err("max_retries must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Queues, polled in this order each dispatcher tick.
    pub queues: Vec<QueueConfig>,
    /// Queue receiving recurring instances and requests without a queue.
    #[serde(default = "default_queue_name")]
    pub default_queue: String,
    /// Dispatcher sleep between ticks, in milliseconds.
    #[serde(default = "default_poll_ms")]
    pub dispatcher_poll_interval_ms: u64,
    /// Recurring scheduler sleep between ticks, in milliseconds.
    #[serde(default = "default_poll_ms")]
    pub recurring_poll_interval_ms: u64,
    /// How long shutdown waits for in-flight jobs, in seconds.
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_queue_name() -> String {
    "default".into()
}

const fn default_poll_ms() -> u64 {
    500
}

const fn default_grace_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queues: vec![QueueConfig::new("default"), QueueConfig::new("downloads")],
            default_queue: default_queue_name(),
            dispatcher_poll_interval_ms: default_poll_ms(),
            recurring_poll_interval_ms: default_poll_ms(),
            shutdown_grace_secs: default_grace_secs(),
        }
    }
}

impl EngineConfig {
    /// Configuration with the given queues; the first becomes the default queue.
    #[must_use]
    pub fn with_queues(queues: Vec<QueueConfig>) -> Self {
        let default_queue = queues
            .first()
            .map_or_else(default_queue_name, |q| q.name.clone());
        Self {
            queues,
            default_queue,
            ..Self::default()
        }
    }

    /// Set both poll intervals.
    #[must_use]
    pub const fn with_poll_intervals(mut self, dispatcher_ms: u64, recurring_ms: u64) -> Self {
        self.dispatcher_poll_interval_ms = dispatcher_ms;
        self.recurring_poll_interval_ms = recurring_ms;
        self
    }

    /// Set the shutdown grace period.
    #[must_use]
    pub const fn with_shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.shutdown_grace_secs = secs;
        self
    }

    /// Look up a queue by name.
    #[must_use]
    pub fn queue(&self, name: &str) -> Option<&QueueConfig> {
        self.queues.iter().find(|q| q.name == name)
    }

    /// Dispatcher poll interval.
    #[must_use]
    pub const fn dispatcher_poll_interval(&self) -> Duration {
        Duration::from_millis(self.dispatcher_poll_interval_ms)
    }

    /// Recurring scheduler poll interval.
    #[must_use]
    pub const fn recurring_poll_interval(&self) -> Duration {
        Duration::from_millis(self.recurring_poll_interval_ms)
    }

    /// Shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Validate all queues and global settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.queues.is_empty() {
            return Err("at least one queue must be defined".into());
        }
        let mut seen = HashSet::new();
        for queue in &self.queues {
            queue
                .validate()
                .map_err(|e| format!("queue `{}` invalid: {e}", queue.name))?;
            if !seen.insert(queue.name.as_str()) {
                return Err(format!("queue `{}` defined twice", queue.name));
            }
        }
        if self.queue(&self.default_queue).is_none() {
            return Err(format!("default queue `{}` is not defined", self.default_queue));
        }
        if self.dispatcher_poll_interval_ms == 0 {
            return Err("dispatcher_poll_interval_ms must be greater than 0".into());
        }
        if self.recurring_poll_interval_ms == 0 {
            return Err("recurring_poll_interval_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment.
    ///
    /// Reads `.env` if present, then the JSON file named by
    /// `JOB_ENGINE_CONFIG` (defaults otherwise), then applies the poll
    /// interval overrides.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_process_env()
    }

    /// Like [`EngineConfig::from_env`] but reads variables from the dotenv
    /// file at `path`, which must exist. Variables already set in the
    /// process win over the file.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        dotenvy::from_path(path).map_err(|e| format!("cannot load `{}`: {e}", path.display()))?;
        Self::from_process_env()
    }

    fn from_process_env() -> Result<Self, String> {
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| format!("cannot read `{path}`: {e}"))?;
                serde_json::from_str(&raw).map_err(|e| format!("parse error in `{path}`: {e}"))?
            }
            Err(_) => Self::default(),
        };
        if let Some(ms) = env_millis(DISPATCHER_POLL_ENV)? {
            cfg.dispatcher_poll_interval_ms = ms;
        }
        if let Some(ms) = env_millis(RECURRING_POLL_ENV)? {
            cfg.recurring_poll_interval_ms = ms;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_millis(var: &str) -> Result<Option<u64>, String> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| format!("{var} must be an integer: {e}")),
        Err(_) => Ok(None),
    }
}
