//! In-memory bookkeeping of running jobs.
//!
//! A single `parking_lot::Mutex` guards the per-queue id sets and the
//! per-group counters. Group limits span queues, so every check-and-insert
//! and every removal goes through the same critical section.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::serde::JobId;

/// Why a reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveRejection {
    /// The queue already runs `max_threads` jobs.
    QueueFull,
    /// The group already runs `max_per_group` jobs across all queues.
    GroupFull,
    /// The job id is already running.
    AlreadyRunning,
}

impl fmt::Display for ReserveRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "queue at capacity"),
            Self::GroupFull => write!(f, "group at capacity"),
            Self::AlreadyRunning => write!(f, "job already running"),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    queue: String,
    group: String,
}

#[derive(Debug, Default)]
struct RunningState {
    queues: HashMap<String, HashSet<JobId>>,
    groups: HashMap<String, usize>,
    slots: HashMap<JobId, Slot>,
}

/// Point-in-time view of the running set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningSnapshot {
    /// Running jobs per queue.
    pub by_queue: HashMap<String, usize>,
    /// Running jobs per group key.
    pub by_group: HashMap<String, usize>,
}

/// Scheduler-owned set of running job ids, shared between the dispatcher and
/// the execution supervisors.
#[derive(Debug, Default)]
pub struct RunningSet {
    state: Mutex<RunningState>,
}

impl RunningSet {
    /// Create an empty running set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check both caps and insert `id` if absent.
    ///
    /// The returned guard releases the slot when dropped.
    ///
    /// # Errors
    ///
    /// Returns the [`ReserveRejection`] that prevented the reservation.
    pub fn reserve(
        self: &Arc<Self>,
        queue: &str,
        id: JobId,
        group: &str,
        max_threads: usize,
        max_per_group: usize,
    ) -> Result<Reservation, ReserveRejection> {
        let mut state = self.state.lock();
        if state.slots.contains_key(&id) {
            return Err(ReserveRejection::AlreadyRunning);
        }
        if state.queues.get(queue).map_or(0, HashSet::len) >= max_threads {
            return Err(ReserveRejection::QueueFull);
        }
        if state.groups.get(group).copied().unwrap_or(0) >= max_per_group {
            return Err(ReserveRejection::GroupFull);
        }

        state.queues.entry(queue.to_string()).or_default().insert(id);
        *state.groups.entry(group.to_string()).or_insert(0) += 1;
        state.slots.insert(
            id,
            Slot {
                queue: queue.to_string(),
                group: group.to_string(),
            },
        );
        drop(state);

        Ok(Reservation {
            set: Arc::clone(self),
            id,
            released: false,
        })
    }

    /// Remove `id`, returning whether it was present.
    pub fn release(&self, id: JobId) -> bool {
        let mut state = self.state.lock();
        let Some(slot) = state.slots.remove(&id) else {
            return false;
        };
        if let Some(ids) = state.queues.get_mut(&slot.queue) {
            ids.remove(&id);
        }
        if let Some(count) = state.groups.get_mut(&slot.group) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.groups.remove(&slot.group);
            }
        }
        true
    }

    /// Running jobs in `queue`.
    #[must_use]
    pub fn queue_len(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, HashSet::len)
    }

    /// Running jobs sharing `group`, across all queues.
    #[must_use]
    pub fn group_count(&self, group: &str) -> usize {
        self.state.lock().groups.get(group).copied().unwrap_or(0)
    }

    /// Whether `id` holds a slot.
    #[must_use]
    pub fn contains(&self, id: JobId) -> bool {
        self.state.lock().slots.contains_key(&id)
    }

    /// Total running jobs.
    #[must_use]
    pub fn total(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Copy the current counters.
    #[must_use]
    pub fn snapshot(&self) -> RunningSnapshot {
        let state = self.state.lock();
        RunningSnapshot {
            by_queue: state
                .queues
                .iter()
                .filter(|(_, ids)| !ids.is_empty())
                .map(|(queue, ids)| (queue.clone(), ids.len()))
                .collect(),
            by_group: state.groups.clone(),
        }
    }
}

/// A held slot in the [`RunningSet`]. Dropping it releases the slot, so the
/// release happens on every exit path of the owner, including cancellation
/// and unwinding.
#[derive(Debug)]
pub struct Reservation {
    set: Arc<RunningSet>,
    id: JobId,
    released: bool,
}

impl Reservation {
    /// The reserved job id.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.id
    }

    /// Release the slot now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.set.release(self.id);
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.release_inner();
    }
}
