//! Scheduler counter and policy tests. These run against wall-clock time
//! with second-scale frequencies, mirroring the scheduling granularity.

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::{definition, mock_registry, sh_options, OK_FRAME};
use serde_json::json;
use tributary_core::definition::ScheduleDefinition;
use tributary_core::pipeline::Pipeline;
use tributary_core::scheduler::Scheduler;
use tributary_core::Error;

fn trivial_pipeline(script: &str) -> Pipeline {
    let definition = definition(json!({
        "sources": [{"type": "mock", "id": "src"}],
        "sinks": [{"type": "mock", "id": "out"}]
    }));
    Pipeline::new(&definition, "scheduled", &mock_registry(), sh_options(script)).unwrap()
}

fn schedule(frequency: Duration, samples: Option<u64>) -> ScheduleDefinition {
    ScheduleDefinition {
        frequency,
        samples,
        start: None,
        stop_on_failure: false,
    }
}

#[tokio::test]
async fn collects_the_requested_samples() {
    let mut scheduler = Scheduler::new(
        trivial_pipeline(OK_FRAME),
        &schedule(Duration::from_secs(1), Some(3)),
    );

    let started = Instant::now();
    scheduler.run().await.unwrap();
    let elapsed = started.elapsed();

    let runs = scheduler.runs();
    assert_eq!(runs.passed, 3);
    assert_eq!(runs.failed, 0);
    assert_eq!(runs.missed, 0);
    // Three runs, two sleeps of ~1s in between
    assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);
    assert!(scheduler.last_run_epoch().is_some());
}

#[tokio::test]
async fn slow_runs_increment_the_missed_counter() {
    // Each run takes ~1.3 seconds against a 1 second frequency
    let script = r#"sleep 1.3; echo '{"duration_seconds":1.3,"data":{"ok":true}}'"#;
    let mut scheduler = Scheduler::new(
        trivial_pipeline(script),
        &schedule(Duration::from_secs(1), Some(2)),
    );

    scheduler.run().await.unwrap();

    let runs = scheduler.runs();
    assert_eq!(runs.passed, 2);
    assert_eq!(runs.failed, 0);
    assert!(runs.missed >= 1, "missed {}", runs.missed);
}

#[tokio::test]
async fn stop_on_failure_terminates_the_loop() {
    let crash = r#"echo '{"duration_seconds":0.0,"data":null}'; exit 1"#;
    let mut scheduler = Scheduler::new(
        trivial_pipeline(crash),
        &ScheduleDefinition {
            frequency: Duration::from_secs(1),
            samples: Some(1),
            start: None,
            stop_on_failure: true,
        },
    );

    let err = scheduler.run().await.unwrap_err();
    assert!(matches!(
        err,
        Error::SchedulerStopOnFailure { failed: 1 }
    ));

    let runs = scheduler.runs();
    assert_eq!(runs.passed, 0);
    assert_eq!(runs.failed, 1);
}

#[tokio::test]
async fn start_time_in_the_past_is_rejected() {
    let mut scheduler = Scheduler::new(
        trivial_pipeline(OK_FRAME),
        &ScheduleDefinition {
            frequency: Duration::from_secs(1),
            samples: Some(1),
            start: Some(1),
            stop_on_failure: false,
        },
    );

    let err = scheduler.run().await.unwrap_err();
    assert!(matches!(err, Error::InvalidDefinition(_)));
    assert_eq!(scheduler.runs().passed, 0);
}
