//! Tests for error types

use prometheus_job_engine::core::EngineError;

#[test]
fn test_store_error() {
    let err = EngineError::Store("connection reset".to_string());
    assert_eq!(format!("{}", err), "store error: connection reset");
}

#[test]
fn test_unknown_queue_error() {
    let err = EngineError::UnknownQueue("bulk".to_string());
    assert_eq!(format!("{}", err), "unknown queue: bulk");
}

#[test]
fn test_already_started_error() {
    assert_eq!(format!("{}", EngineError::AlreadyStarted), "engine already started");
}

#[test]
fn test_grace_exceeded_error() {
    let err = EngineError::GraceExceeded { still_running: 3 };
    assert_eq!(format!("{}", err), "shutdown grace exceeded with 3 job(s) still running");
}

#[test]
fn test_converts_into_anyhow() {
    let err: anyhow::Error = EngineError::InvalidRequest("empty job type".into()).into();
    assert_eq!(err.to_string(), "invalid request: empty job type");
}
