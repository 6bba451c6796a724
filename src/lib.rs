//! # Prometheus Job Engine
//!
//! A durable-queue job scheduling and execution engine.
//!
//! Jobs are held in an abstract [`core::JobStore`] and dispatched under two
//! limits: a per-queue concurrency cap and a per-group cap counted across
//! every queue. Failed jobs are retried with a fixed backoff until a retry
//! limit is reached, and recurring definitions are turned into job instances
//! on a timer.
//!
//! ## Components
//!
//! - **Fairness selector**: picks which waiting jobs start this tick, highest
//!   priority first and round-robin across group keys.
//! - **Queue dispatcher**: the only writer of Waiting to Running. Reserves a
//!   slot in the shared running set, persists the status and hands the job
//!   off without waiting for it.
//! - **Execution supervisor**: runs the executor, maps the outcome to a store
//!   transition and releases the slot on every exit path.
//! - **Recurring scheduler**: enqueues due definitions once and catches their
//!   next run up past now.
//! - **Job manager**: the administrative API for enqueueing and maintaining
//!   recurring definitions.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_job_engine::builders::EngineBuilder;
//! use prometheus_job_engine::config::EngineConfig;
//! use prometheus_job_engine::core::{EnqueueRequest, HandlerRegistry};
//! use prometheus_job_engine::infra::InMemoryJobStore;
//! use prometheus_job_engine::runtime::TokioSpawner;
//!
//! let registry = HandlerRegistry::new().with_handler(Arc::new(MyDownloadHandler));
//! let engine = EngineBuilder::new(EngineConfig::from_env()?)
//!     .build(Arc::new(InMemoryJobStore::new()), registry, TokioSpawner::current()?)?;
//!
//! engine.start().await?;
//! engine
//!     .manager()
//!     .enqueue_job(EnqueueRequest::new("download", r#"{"chapter":12}"#).with_queue("downloads"))
//!     .await?;
//! // ...
//! engine.shutdown().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and the engine.
pub mod core;
/// Configuration models for queues, poll intervals and shutdown.
pub mod config;
/// Builders to assemble an engine from configuration.
pub mod builders;
/// Store backends.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
