//! Tests for runtime adapters and API payloads

use std::sync::Arc;

use prometheus_job_engine::config::EngineConfig;
use prometheus_job_engine::core::{RunningSet, Spawn};
use prometheus_job_engine::runtime::{health, list_queues, TokioSpawner};
use prometheus_job_engine::util::new_id;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_list_queues_reports_running_counts() {
    let cfg = EngineConfig::default();
    let running = Arc::new(RunningSet::new());
    let _slot = running.reserve("downloads", new_id(), "mangadex", 10, 3).unwrap();

    let queues = list_queues(&cfg, &running);

    assert_eq!(queues.len(), 2);
    assert_eq!(queues[0].name, "default");
    assert_eq!(queues[0].running, 0);
    assert_eq!(queues[1].name, "downloads");
    assert_eq!(queues[1].running, 1);
    assert_eq!(queues[1].max_threads, 10);

    let status = health(&running);
    assert!(status.ok);
    assert_eq!(status.running, 1);
}
