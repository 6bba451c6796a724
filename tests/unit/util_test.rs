//! Tests for utility functions

use std::time::Duration;

use prometheus_job_engine::util::{add_duration, init_tracing_with, new_id, now_ms, Priority};

#[test]
fn test_priority_ordering() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn test_priority_serde_names() {
    assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"critical\"");
    let parsed: Priority = serde_json::from_str("\"low\"").unwrap();
    assert_eq!(parsed, Priority::Low);
}

#[test]
fn test_clock_helpers() {
    let now = now_ms();
    assert!(now > 0);
    assert_eq!(add_duration(1_000, Duration::from_millis(250)), 1_250);
}

#[test]
fn test_ids_are_unique() {
    assert_ne!(new_id(), new_id());
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing_with("debug");
    init_tracing_with("info");
}
