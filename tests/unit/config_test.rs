//! Tests for configuration validation and loading

use std::io::Write;

use parking_lot::{Mutex, MutexGuard};
use prometheus_job_engine::config::engine::{
    CONFIG_PATH_ENV, DISPATCHER_POLL_ENV, RECURRING_POLL_ENV,
};
use prometheus_job_engine::config::{EngineConfig, QueueConfig};

#[test]
fn test_default_mirrors_production_queues() {
    let cfg = EngineConfig::default();
    assert!(cfg.validate().is_ok());
    let names: Vec<&str> = cfg.queues.iter().map(|q| q.name.as_str()).collect();
    assert_eq!(names, vec!["default", "downloads"]);
    assert_eq!(cfg.default_queue, "default");
    assert_eq!(cfg.dispatcher_poll_interval_ms, 500);
    let downloads = cfg.queue("downloads").unwrap();
    assert_eq!(downloads.max_threads, 10);
    assert_eq!(downloads.max_retries, 150);
}

#[test]
fn test_from_json_str_applies_defaults() {
    let cfg = EngineConfig::from_json_str(
        r#"{
            "queues": [
                {
                    "name": "default",
                    "max_threads": 4,
                    "max_per_group": 2,
                    "max_retries": 5,
                    "retry_backoff_secs": 30
                }
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.default_queue, "default");
    assert_eq!(cfg.recurring_poll_interval_ms, 500);
    assert_eq!(cfg.shutdown_grace_secs, 30);
    assert_eq!(cfg.queues[0].max_per_group, 2);
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(EngineConfig::from_json_str("{").unwrap_err().starts_with("parse error"));
    let err = EngineConfig::from_json_str(
        r#"{"queues": [{
            "name": "default",
            "max_threads": 0,
            "max_per_group": 2,
            "max_retries": 5,
            "retry_backoff_secs": 30
        }]}"#,
    )
    .unwrap_err();
    assert!(err.contains("max_threads"));
}

#[test]
fn test_empty_queue_list_rejected() {
    let cfg = EngineConfig::with_queues(Vec::new());
    assert!(cfg.validate().is_err());
}

#[test]
fn test_queue_builder_methods() {
    let queue = QueueConfig::new("downloads")
        .with_max_threads(2)
        .with_max_per_group(1)
        .with_max_retries(9)
        .with_retry_backoff_secs(12);
    assert!(queue.validate().is_ok());
    assert_eq!(queue.retry_backoff().as_secs(), 12);
}

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that touch the engine variables and clears them on drop.
struct EnvGuard {
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn acquire() -> Self {
        let guard = Self {
            _lock: ENV_LOCK.lock(),
        };
        clear_engine_vars();
        guard
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        clear_engine_vars();
    }
}

fn clear_engine_vars() {
    for var in [CONFIG_PATH_ENV, DISPATCHER_POLL_ENV, RECURRING_POLL_ENV] {
        std::env::remove_var(var);
    }
}

fn config_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

const BULK_QUEUES: &str = r#"{
    "queues": [
        {
            "name": "bulk",
            "max_threads": 2,
            "max_per_group": 1,
            "max_retries": 4,
            "retry_backoff_secs": 10
        }
    ]
}"#;

#[test]
fn test_from_env_reads_file_and_poll_overrides() {
    let _env = EnvGuard::acquire();
    let file = config_file(BULK_QUEUES);
    std::env::set_var(CONFIG_PATH_ENV, file.path());
    std::env::set_var(DISPATCHER_POLL_ENV, "25");
    std::env::set_var(RECURRING_POLL_ENV, " 40 ");

    let cfg = EngineConfig::from_env().unwrap();

    assert_eq!(cfg.default_queue, "bulk");
    assert_eq!(cfg.queue("bulk").unwrap().max_retries, 4);
    assert_eq!(cfg.dispatcher_poll_interval_ms, 25);
    assert_eq!(cfg.recurring_poll_interval_ms, 40);
}

#[test]
fn test_from_env_without_variables_uses_defaults() {
    let _env = EnvGuard::acquire();
    assert_eq!(EngineConfig::from_env().unwrap(), EngineConfig::default());
}

#[test]
fn test_from_env_rejects_non_integer_override() {
    let _env = EnvGuard::acquire();
    std::env::set_var(DISPATCHER_POLL_ENV, "fast");

    let err = EngineConfig::from_env().unwrap_err();

    assert!(err.starts_with("JOB_ENGINE_DISPATCHER_POLL_MS must be an integer"), "{err}");
}

#[test]
fn test_from_env_rejects_zero_override() {
    let _env = EnvGuard::acquire();
    std::env::set_var(RECURRING_POLL_ENV, "0");

    let err = EngineConfig::from_env().unwrap_err();

    assert!(err.contains("recurring_poll_interval_ms"), "{err}");
}

#[test]
fn test_from_env_reports_missing_config_file() {
    let _env = EnvGuard::acquire();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var(CONFIG_PATH_ENV, dir.path().join("absent.json"));

    let err = EngineConfig::from_env().unwrap_err();

    assert!(err.starts_with("cannot read"), "{err}");
}

#[test]
fn test_from_env_file_loads_dotenv_variables() {
    let _env = EnvGuard::acquire();
    let dir = tempfile::tempdir().unwrap();
    let json = dir.path().join("engine.json");
    std::fs::write(&json, BULK_QUEUES).unwrap();
    let dotenv = dir.path().join(".env");
    std::fs::write(
        &dotenv,
        format!(
            "{CONFIG_PATH_ENV}={}\n{RECURRING_POLL_ENV}=75\n",
            json.display()
        ),
    )
    .unwrap();
    std::env::set_var(DISPATCHER_POLL_ENV, "15");

    let cfg = EngineConfig::from_env_file(&dotenv).unwrap();

    assert_eq!(cfg.default_queue, "bulk");
    assert_eq!(cfg.recurring_poll_interval_ms, 75);
    assert_eq!(cfg.dispatcher_poll_interval_ms, 15);
}

#[test]
fn test_from_env_file_requires_existing_file() {
    let _env = EnvGuard::acquire();
    let dir = tempfile::tempdir().unwrap();

    let err = EngineConfig::from_env_file(dir.path().join(".env")).unwrap_err();

    assert!(err.starts_with("cannot load"), "{err}");
}
