//! Tests for lifecycle events

use prometheus_job_engine::core::{
    build_job_event, EventSink, InMemoryEventSink, JobEventKind, NewJob,
};
use prometheus_job_engine::util::{new_id, Priority};

#[test]
fn test_event_serializes_snake_case_kind() {
    let job = NewJob {
        job_type: "download".into(),
        parameters: "{}".into(),
        key: "download_1".into(),
        group_key: "mangadex".into(),
        queue: "downloads".into(),
        priority: Priority::High,
        enqueued_at_ms: 0,
        scheduled_at_ms: 0,
    }
    .into_instance(new_id());

    let event = build_job_event(&job, JobEventKind::RolledBack, Some("store down".into()));
    let json = serde_json::to_value(&event).unwrap();

    assert_eq!(json["kind"], "rolled_back");
    assert_eq!(json["queue"], "downloads");
    assert_eq!(json["detail"], "store down");
}

#[test]
fn test_sink_filters_by_job() {
    let sink = InMemoryEventSink::new(10);
    let make = |kind| {
        let job = NewJob {
            job_type: "scan".into(),
            parameters: String::new(),
            key: "scan".into(),
            group_key: "scan".into(),
            queue: "default".into(),
            priority: Priority::Normal,
            enqueued_at_ms: 0,
            scheduled_at_ms: 0,
        }
        .into_instance(new_id());
        let event = build_job_event(&job, kind, None);
        (job.id, event)
    };
    let (first, event) = make(JobEventKind::Started);
    sink.record(event);
    let (_, event) = make(JobEventKind::Completed);
    sink.record(event);

    assert_eq!(sink.events().len(), 2);
    assert_eq!(sink.events_for(first), vec![JobEventKind::Started]);
}
