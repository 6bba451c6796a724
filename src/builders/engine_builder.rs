//! Builder that validates configuration and assembles a [`JobEngine`].

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::{EngineError, EventSink, JobEngine, JobExecutor, JobStore, Spawn};

/// Validates an [`EngineConfig`] and wires the engine's collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    events: Option<Arc<dyn EventSink>>,
}

impl EngineBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config, events: None }
    }

    /// Report lifecycle events to `sink`.
    #[must_use]
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Validate the configuration and build the engine.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidConfig`] when validation fails.
    pub fn build<St, E, S>(
        self,
        store: Arc<St>,
        executor: E,
        spawner: S,
    ) -> Result<JobEngine<St, E, S>, EngineError>
    where
        St: JobStore,
        E: JobExecutor,
        S: Spawn + Clone + Send + Sync + 'static,
    {
        self.config.validate().map_err(EngineError::InvalidConfig)?;
        tracing::debug!(
            queues = self.config.queues.len(),
            default_queue = %self.config.default_queue,
            "building job engine"
        );
        Ok(JobEngine::with_event_sink(
            self.config,
            store,
            executor,
            spawner,
            self.events,
        ))
    }
}
