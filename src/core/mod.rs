//! Core scheduling abstractions: job model, fairness, reservation,
//! dispatch, supervision and the recurring scheduler.

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod fairness;
pub mod job;
pub mod manager;
pub mod recurring;
pub mod running;
pub mod spawn;
pub mod stagger;
pub mod store;
pub mod supervisor;

pub use dispatcher::{DispatchReport, QueueDispatcher};
pub use engine::{EngineStats, JobEngine};
pub use error::{AppResult, EngineError};
pub use events::{build_job_event, EventSink, InMemoryEventSink, JobEvent, JobEventKind};
pub use executor::{HandlerRegistry, JobContext, JobExecutor, JobHandler};
pub use fairness::{group_allowance, select_fair};
pub use job::{
    EnqueueRequest, JobInstance, JobOutcome, JobStatus, NewJob, RecurringJobDefinition,
    RecurringJobRequest, Transition,
};
pub use manager::{instance_key, JobManager};
pub use recurring::{advance_next_run, RecurringScheduler, RecurringTickReport};
pub use running::{Reservation, ReserveRejection, RunningSet, RunningSnapshot};
pub use spawn::Spawn;
pub use stagger::{least_used_slot, slot_count, staggered_run, STAGGER_STEP};
pub use store::JobStore;
pub use supervisor::{ExecutionSupervisor, RetryPolicy};
