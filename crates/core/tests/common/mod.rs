//! Shared fixtures for pipeline-level tests.
//!
//! Pipelines in these tests run against a substitute `/bin/sh` worker
//! command, so the mock component bodies below are never executed; they
//! exist to satisfy construction-time validation.

// Each test binary uses a different subset of these fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use tributary_core::component::{
    Aggregator, Bundle, Component, ComponentContext, Sink, Source,
};
use tributary_core::definition::PipelineDefinition;
use tributary_core::host::WorkerLauncher;
use tributary_core::pipeline::PipelineOptions;
use tributary_core::registry::Registry;
use tributary_core::Result;

/// Result frame for components that should succeed
pub const OK_FRAME: &str = r#"echo '{"duration_seconds":0.01,"data":{"ok":true}}'"#;

/// Script that crashes components whose id is `bad` and succeeds otherwise.
/// The worker envelope arrives on stdin, so the id is grep-able.
pub const BAD_ID_CRASHES: &str = concat!(
    r#"if grep -q '"id":"bad"'; then echo '{"duration_seconds":0.0,"data":null}'; exit 1; fi; "#,
    r#"echo '{"duration_seconds":0.01,"data":{"ok":true}}'"#,
);

/// Like [`BAD_ID_CRASHES`] but matches every id starting with `bad`
pub const BAD_PREFIX_CRASHES: &str = concat!(
    r#"if grep -q '"id":"bad'; then echo '{"duration_seconds":0.0,"data":null}'; exit 1; fi; "#,
    r#"echo '{"duration_seconds":0.01,"data":{"ok":true}}'"#,
);

#[derive(Default)]
pub struct MockSource;

impl Component for MockSource {}

#[async_trait]
impl Source for MockSource {
    async fn collect(&self, _ctx: &ComponentContext) -> Result<Bundle> {
        let mut data = Bundle::new();
        data.insert("ok".to_string(), Value::Bool(true));
        Ok(data)
    }
}

#[derive(Default)]
pub struct MockAggregator;

impl Component for MockAggregator {}

#[async_trait]
impl Aggregator for MockAggregator {
    async fn accumulate(&self, _ctx: &ComponentContext, _data: &mut Bundle) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSink;

impl Component for MockSink {}

#[async_trait]
impl Sink for MockSink {
    async fn distribute(&self, _ctx: &ComponentContext, _data: &Bundle) -> Result<()> {
        Ok(())
    }
}

/// Registry with `mock` registered for every kind
pub fn mock_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_source("mock", || Box::new(MockSource));
    registry.register_aggregator("mock", || Box::new(MockAggregator));
    registry.register_sink("mock", || Box::new(MockSink));
    registry
}

/// Parse a definition from inline JSON
pub fn definition(value: Value) -> PipelineDefinition {
    PipelineDefinition::from_value(value).expect("test definition is valid")
}

/// Pipeline options running every component through a shell script
pub fn sh_options(script: &str) -> PipelineOptions {
    PipelineOptions {
        save_journal: false,
        launcher: Some(WorkerLauncher::external("/bin/sh", ["-c", script])),
        ..PipelineOptions::default()
    }
}
