//! Child-side half of the component execution protocol.
//!
//! The host spawns the current executable with [`WORKER_ENV_VAR`] set. The
//! binary's entry point must detect this (see [`worker_requested`]) and call
//! [`run_worker`] instead of its normal startup path.
//!
//! Protocol, one message each way over the standard pipes:
//!
//! 1. Parent writes a single [`WorkerEnvelope`] JSON line to the child's
//!    stdin: component identity, raw configuration and stage input.
//! 2. Child instantiates the component from the registry, validates its
//!    configuration, runs the kind-specific method and writes a single
//!    [`WorkerResult`] JSON line to stdout:
//!    `{"duration_seconds": <f64>, "data": <value>}`.
//!
//! `data: null` is the crash sentinel: the component could not produce a
//! result (construction failure, body error, or a source returning empty or
//! non-mapping data). The child then exits non-zero. Everything written to
//! the child's stderr is forwarded into the parent's log.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::component::{ComponentContext, ComponentKind};
use crate::proctitle;
use crate::registry::Registry;
use crate::{Error, Result};

/// Environment variable marking a process as a component worker
pub const WORKER_ENV_VAR: &str = "TRIBUTARY_WORKER";

/// Execution request written to the worker's stdin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEnvelope {
    pub kind: ComponentKind,

    #[serde(rename = "type")]
    pub type_name: String,

    pub id: String,

    pub index: usize,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Raw user configuration; the worker re-validates it, which yields the
    /// same record the parent validated at pipeline construction
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Stage input: the bundle for aggregators and sinks, absent for sources
    #[serde(default)]
    pub input: Option<Value>,
}

/// Execution result written to the worker's stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    /// Seconds the component body ran
    pub duration_seconds: f64,

    /// Produced data, or `null` when the execution crashed
    pub data: Option<Value>,
}

/// Whether this process was spawned as a component worker
pub fn worker_requested() -> bool {
    std::env::var_os(WORKER_ENV_VAR).is_some()
}

/// Run the worker protocol to completion and return the process exit code.
///
/// Never panics out; every failure path still attempts to deliver the crash
/// sentinel so the parent can classify the execution.
pub async fn run_worker(registry: &Registry) -> i32 {
    let envelope = match read_envelope().await {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::error!("Worker could not read its envelope: {}", err);
            let _ = write_result(&WorkerResult {
                duration_seconds: 0.0,
                data: None,
            })
            .await;
            return 1;
        }
    };

    proctitle::set_title(&format!(
        "{}.{}.{}",
        envelope.kind, envelope.type_name, envelope.id
    ));

    let (duration_seconds, data) = execute(registry, &envelope).await;
    let failed = data.is_none();
    if let Err(err) = write_result(&WorkerResult {
        duration_seconds,
        data,
    })
    .await
    {
        tracing::error!("Worker could not deliver its result: {}", err);
        return 1;
    }

    if failed {
        1
    } else {
        0
    }
}

async fn read_envelope() -> Result<WorkerEnvelope> {
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());
    stdin.read_line(&mut line).await?;
    Ok(serde_json::from_str(line.trim_end())?)
}

async fn write_result(result: &WorkerResult) -> Result<()> {
    let mut line = serde_json::to_string(result)?;
    line.push('\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Run the component and measure its body. A `None` payload is the crash
/// sentinel; the error it stands for has already been logged to stderr.
async fn execute(registry: &Registry, envelope: &WorkerEnvelope) -> (f64, Option<Value>) {
    let timeout = envelope.timeout_seconds.map(std::time::Duration::from_secs);

    match envelope.kind {
        ComponentKind::Source => {
            let factory = match registry.source(&envelope.type_name) {
                Ok(factory) => factory,
                Err(err) => return construction_failure(envelope, err),
            };
            let component = factory();
            let ctx = match build_context(component.as_ref(), envelope, timeout) {
                Ok(ctx) => ctx,
                Err(err) => return construction_failure(envelope, err),
            };

            let start = Instant::now();
            let result = component.collect(&ctx).await;
            let duration = start.elapsed().as_secs_f64();
            match result {
                Ok(data) if !data.is_empty() => (duration, Some(Value::Object(data))),
                Ok(_) => {
                    tracing::error!(
                        "{}",
                        Error::SourceProducedInvalid {
                            id: envelope.id.clone()
                        }
                    );
                    (duration, None)
                }
                Err(err) => {
                    tracing::error!("Source {} failed: {}", ctx, err);
                    (duration, None)
                }
            }
        }
        ComponentKind::Aggregator => {
            let factory = match registry.aggregator(&envelope.type_name) {
                Ok(factory) => factory,
                Err(err) => return construction_failure(envelope, err),
            };
            let component = factory();
            let ctx = match build_context(component.as_ref(), envelope, timeout) {
                Ok(ctx) => ctx,
                Err(err) => return construction_failure(envelope, err),
            };

            let mut bundle = match bundle_input(envelope) {
                Ok(bundle) => bundle,
                Err(err) => return construction_failure(envelope, err),
            };

            let start = Instant::now();
            let result = component.accumulate(&ctx, &mut bundle).await;
            let duration = start.elapsed().as_secs_f64();
            match result {
                Ok(()) => (duration, Some(Value::Object(bundle))),
                Err(err) => {
                    tracing::error!("Aggregator {} failed: {}", ctx, err);
                    (duration, None)
                }
            }
        }
        ComponentKind::Sink => {
            let factory = match registry.sink(&envelope.type_name) {
                Ok(factory) => factory,
                Err(err) => return construction_failure(envelope, err),
            };
            let component = factory();
            let ctx = match build_context(component.as_ref(), envelope, timeout) {
                Ok(ctx) => ctx,
                Err(err) => return construction_failure(envelope, err),
            };

            let bundle = match bundle_input(envelope) {
                Ok(bundle) => bundle,
                Err(err) => return construction_failure(envelope, err),
            };

            let start = Instant::now();
            let result = component.distribute(&ctx, &bundle).await;
            let duration = start.elapsed().as_secs_f64();
            match result {
                // Sinks return no payload; an empty mapping signals success
                Ok(()) => (duration, Some(Value::Object(Map::new()))),
                Err(err) => {
                    tracing::error!("Sink {} failed: {}", ctx, err);
                    (duration, None)
                }
            }
        }
    }
}

fn build_context<C>(
    component: &C,
    envelope: &WorkerEnvelope,
    timeout: Option<std::time::Duration>,
) -> Result<ComponentContext>
where
    C: crate::component::Component + ?Sized,
{
    ComponentContext::for_component(
        component,
        envelope.kind,
        &envelope.type_name,
        &envelope.id,
        envelope.index,
        envelope.optional,
        timeout,
        &envelope.config,
    )
}

fn construction_failure(envelope: &WorkerEnvelope, err: Error) -> (f64, Option<Value>) {
    tracing::error!(
        "Could not construct {} {}.{}: {}",
        envelope.kind,
        envelope.type_name,
        envelope.id,
        err
    );
    (0.0, None)
}

fn bundle_input(envelope: &WorkerEnvelope) -> Result<Map<String, Value>> {
    match &envelope.input {
        Some(Value::Object(bundle)) => Ok(bundle.clone()),
        other => Err(Error::Component(format!(
            "expected a bundle input, got {}",
            match other {
                Some(value) => value.to_string(),
                None => "nothing".to_string(),
            }
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_round_trip() {
        let envelope = WorkerEnvelope {
            kind: ComponentKind::Source,
            type_name: "timestamp".to_string(),
            id: "ts".to_string(),
            index: 0,
            optional: false,
            timeout_seconds: Some(30),
            config: json!({"epoch": true}).as_object().cloned().unwrap(),
            input: None,
        };

        let line = serde_json::to_string(&envelope).unwrap();
        assert!(line.contains("\"type\":\"timestamp\""));
        let parsed: WorkerEnvelope = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.id, "ts");
        assert_eq!(parsed.timeout_seconds, Some(30));
    }

    #[test]
    fn test_result_sentinel_serializes_null() {
        let result = WorkerResult {
            duration_seconds: 0.5,
            data: None,
        };
        let line = serde_json::to_string(&result).unwrap();
        assert!(line.contains("\"data\":null"));
    }
}
