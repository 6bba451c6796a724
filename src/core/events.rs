//! Job lifecycle events and sinks.
//!
//! The dispatcher and supervisors report every state change they make. Sinks
//! must be cheap; they are called inline on the dispatch and completion paths.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::job::JobInstance;
use crate::util::clock::now_ms;
use crate::util::serde::JobId;

/// Kind of lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    /// Created or re-armed by the recurring scheduler.
    Enqueued,
    /// Reserved, persisted as Running and handed off.
    Started,
    /// Marked Completed.
    Completed,
    /// Returned to Waiting with a delayed schedule.
    Retrying,
    /// Marked Failed after exhausting retries.
    Failed,
    /// Left alone because the executor handled it.
    Handled,
    /// Completed and its recurring definition deleted.
    Deleted,
    /// Reservation released because persisting Running failed.
    RolledBack,
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Related job.
    pub job_id: JobId,
    /// Job-type tag.
    pub job_type: String,
    /// Queue the job belongs to.
    pub queue: String,
    /// What happened.
    pub kind: JobEventKind,
    /// Timestamp milliseconds.
    pub at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Destination for lifecycle events.
pub trait EventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: JobEvent);
}

/// Bounded in-memory sink for testing and dev. Clones share one buffer.
#[derive(Clone)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<VecDeque<JobEvent>>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a sink keeping at most `max_events` recent events.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events recorded for one job, oldest first.
    #[must_use]
    pub fn events_for(&self, job_id: JobId) -> Vec<JobEventKind> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.job_id == job_id)
            .map(|e| e.kind)
            .collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, event: JobEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Build an event for `job`.
#[must_use]
pub fn build_job_event(job: &JobInstance, kind: JobEventKind, detail: Option<String>) -> JobEvent {
    JobEvent {
        job_id: job.id,
        job_type: job.job_type.clone(),
        queue: job.queue.clone(),
        kind,
        at_ms: now_ms(),
        detail,
    }
}

/// Record through an optional sink.
pub(crate) fn emit(
    sink: Option<&Arc<dyn EventSink>>,
    job: &JobInstance,
    kind: JobEventKind,
    detail: Option<String>,
) {
    if let Some(sink) = sink {
        sink.record(build_job_event(job, kind, detail));
    }
}
