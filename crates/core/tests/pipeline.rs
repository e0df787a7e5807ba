//! Pipeline-level tests: construction-time validation, stage ordering,
//! optional-failure semantics and journal persistence.

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::{definition, mock_registry, sh_options, BAD_ID_CRASHES, OK_FRAME};
use serde_json::json;
use tributary_core::component::ExecutionStatus;
use tributary_core::journal::Journal;
use tributary_core::pipeline::{Pipeline, PipelineOptions};
use tributary_core::Error;

#[tokio::test]
async fn happy_path_runs_all_stages() {
    let definition = definition(json!({
        "sources": [{"type": "mock", "id": "ts"}],
        "aggregators": [{"type": "mock", "id": "agg"}],
        "sinks": [{"type": "mock", "id": "out"}]
    }));

    let mut pipeline = Pipeline::new(
        &definition,
        "happy",
        &mock_registry(),
        sh_options(OK_FRAME),
    )
    .unwrap();

    let journal = pipeline.run().await.unwrap();
    assert_eq!(journal.sources.len(), 1);
    assert_eq!(journal.aggregators.len(), 1);
    assert_eq!(journal.sinks.len(), 1);
    assert_eq!(journal.sources[0].status, ExecutionStatus::Succeeded);
    assert_eq!(journal.sinks[0].status, ExecutionStatus::Succeeded);
    assert_eq!(pipeline.executed(), 1);

    // The pipeline instance is reusable; each run spawns fresh children
    let journal = pipeline.run().await.unwrap();
    assert_eq!(journal.sources.len(), 1);
    assert_eq!(pipeline.executed(), 2);
}

#[tokio::test]
async fn unknown_component_type_fails_before_spawning() {
    let definition = definition(json!({
        "sources": [{"type": "nonexistent", "id": "x"}],
        "sinks": [{"type": "mock", "id": "out"}]
    }));

    let err = Pipeline::new(
        &definition,
        "broken",
        &mock_registry(),
        sh_options(OK_FRAME),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownComponentType { .. }));
}

#[tokio::test]
async fn optional_source_failure_keeps_the_run_passing() {
    let definition = definition(json!({
        "sources": [
            {"type": "mock", "id": "good"},
            {"type": "mock", "id": "bad", "optional": true}
        ],
        "sinks": [{"type": "mock", "id": "out"}]
    }));

    let mut pipeline = Pipeline::new(
        &definition,
        "optional",
        &mock_registry(),
        sh_options(BAD_ID_CRASHES),
    )
    .unwrap();

    let journal = pipeline.run().await.unwrap();
    assert_eq!(journal.sources.len(), 2);
    let good = journal.sources.iter().find(|e| e.id == "good").unwrap();
    assert_eq!(good.status, ExecutionStatus::Succeeded);
    let bad = journal.sources.iter().find(|e| e.id == "bad").unwrap();
    assert_eq!(bad.status, ExecutionStatus::Crashed);
    // Sinks still ran
    assert_eq!(journal.sinks[0].status, ExecutionStatus::Succeeded);
}

#[tokio::test]
async fn mixed_optional_and_fatal_failures_fail_the_run() {
    let definition = definition(json!({
        "sources": [
            {"type": "mock", "id": "good"},
            {"type": "mock", "id": "bad", "optional": true},
            {"type": "mock", "id": "bad_fatal"}
        ],
        "sinks": [{"type": "mock", "id": "out"}]
    }));

    let mut pipeline = Pipeline::new(
        &definition,
        "mixed",
        &mock_registry(),
        sh_options(common::BAD_PREFIX_CRASHES),
    )
    .unwrap();

    assert!(pipeline.run().await.is_err());
}

#[tokio::test]
async fn non_optional_source_failure_aborts_before_sinks() {
    let definition = definition(json!({
        "sources": [{"type": "mock", "id": "bad"}],
        "sinks": [{"type": "mock", "id": "out"}]
    }));

    let journal_path = tempfile::tempdir().unwrap();
    let journal_file = journal_path.path().join("journal.json");

    let mut pipeline = Pipeline::new(
        &definition,
        "fatal",
        &mock_registry(),
        PipelineOptions {
            save_journal: true,
            journal_path: Some(journal_file.clone()),
            ..sh_options(BAD_ID_CRASHES)
        },
    )
    .unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(
        err,
        Error::StageAborted {
            stage: tributary_core::component::ComponentKind::Source,
            ..
        }
    ));

    // The journal file still records the attempt; sinks never ran
    let journal: Journal =
        serde_json::from_str(&std::fs::read_to_string(&journal_file).unwrap()).unwrap();
    assert_eq!(journal.sources.len(), 1);
    assert_eq!(journal.sources[0].status, ExecutionStatus::Crashed);
    assert!(journal.sinks.is_empty());
}

#[tokio::test]
async fn timed_out_source_aborts_with_duration_near_deadline() {
    let definition = definition(json!({
        "sources": [{"type": "mock", "id": "slow", "timeout": 1}],
        "sinks": [{"type": "mock", "id": "out"}]
    }));

    let journal_dir = tempfile::tempdir().unwrap();
    let journal_file = journal_dir.path().join("journal.json");

    let mut pipeline = Pipeline::new(
        &definition,
        "timeout",
        &mock_registry(),
        PipelineOptions {
            save_journal: true,
            journal_path: Some(journal_file.clone()),
            ..sh_options("sleep 5")
        },
    )
    .unwrap();

    let started = Instant::now();
    let err = pipeline.run().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(err, Error::StageAborted { .. }));

    let journal: Journal =
        serde_json::from_str(&std::fs::read_to_string(&journal_file).unwrap()).unwrap();
    assert_eq!(journal.sources[0].status, ExecutionStatus::TimedOut);
    let duration = journal.sources[0].duration_seconds.unwrap();
    assert!(duration >= 0.9 && duration < 2.0, "duration {}", duration);
    assert!(journal.sinks.is_empty());
}

#[tokio::test]
async fn aggregators_stage_is_skipped_when_empty() {
    let definition = definition(json!({
        "sources": [{"type": "mock", "id": "src"}],
        "sinks": [{"type": "mock", "id": "out"}]
    }));

    let mut pipeline = Pipeline::new(
        &definition,
        "no_aggregators",
        &mock_registry(),
        sh_options(OK_FRAME),
    )
    .unwrap();

    let journal = pipeline.run().await.unwrap();
    assert!(journal.aggregators.is_empty());
}
