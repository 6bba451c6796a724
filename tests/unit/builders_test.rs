//! Tests for the engine builder

use std::sync::Arc;

use prometheus_job_engine::builders::EngineBuilder;
use prometheus_job_engine::config::{EngineConfig, QueueConfig};
use prometheus_job_engine::core::{
    EngineError, EnqueueRequest, HandlerRegistry, InMemoryEventSink, JobEngine, JobEventKind,
};
use prometheus_job_engine::infra::InMemoryJobStore;
use prometheus_job_engine::runtime::TokioSpawner;

#[tokio::test]
async fn test_build_with_valid_config() {
    let engine = EngineBuilder::new(EngineConfig::default())
        .with_events(Arc::new(InMemoryEventSink::new(16)))
        .build(
            Arc::new(InMemoryJobStore::new()),
            HandlerRegistry::new(),
            TokioSpawner::current().unwrap(),
        )
        .unwrap();

    assert!(engine.has_event_sink());
    assert!(!engine.stats().started);
    assert_eq!(engine.config().queues.len(), 2);
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let mut cfg = EngineConfig::with_queues(vec![QueueConfig::new("default")]);
    cfg.default_queue = "missing".into();

    let result = EngineBuilder::new(cfg).build(
        Arc::new(InMemoryJobStore::new()),
        HandlerRegistry::new(),
        TokioSpawner::current().unwrap(),
    );

    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_event_sink_is_fixed_at_construction() {
    let sink = InMemoryEventSink::new(16);
    let engine = JobEngine::with_event_sink(
        EngineConfig::default(),
        Arc::new(InMemoryJobStore::new()),
        HandlerRegistry::new(),
        TokioSpawner::current().unwrap(),
        Some(Arc::new(sink.clone())),
    );
    assert!(engine.has_event_sink());

    let id = engine
        .manager()
        .enqueue_job(EnqueueRequest::new("scan", "{}"))
        .await
        .unwrap();
    assert_eq!(sink.events_for(id), vec![JobEventKind::Enqueued]);

    let silent = JobEngine::new(
        EngineConfig::default(),
        Arc::new(InMemoryJobStore::new()),
        HandlerRegistry::new(),
        TokioSpawner::current().unwrap(),
    );
    assert!(!silent.has_event_sink());
}
