//! Component model: sources, aggregators and sinks.
//!
//! Components never touch the engine directly. They declare their
//! configuration options through a [`Configurator`], and implement exactly
//! one kind-specific method which the engine runs inside a child process:
//!
//! - [`Source::collect`] takes no input and returns a non-empty mapping.
//!   The mapping becomes the bundle entry under the component's id.
//! - [`Aggregator::accumulate`] receives the current bundle and may add,
//!   remove or mutate any entry.
//! - [`Sink::distribute`] receives a copy of the bundle and performs side
//!   effects. Its return value is discarded.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ConfigRecord, Configurator};
use crate::Result;

/// Ordered mapping flowing through the stages: source id to collected value.
///
/// Iteration order is insertion order (`serde_json` is built with
/// `preserve_order`), and the pipeline re-inserts entries in declared source
/// order after the sources stage.
pub type Bundle = serde_json::Map<String, Value>;

/// The three component kinds, in stage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Source,
    Aggregator,
    Sink,
}

impl ComponentKind {
    /// Singular name used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Source => "source",
            ComponentKind::Aggregator => "aggregator",
            ComponentKind::Sink => "sink",
        }
    }

    /// Stage name, as used for journal sections and process titles
    pub fn plural(&self) -> &'static str {
        match self {
            ComponentKind::Source => "sources",
            ComponentKind::Aggregator => "aggregators",
            ComponentKind::Sink => "sinks",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and frozen configuration of one component instance
#[derive(Debug, Clone)]
pub struct ComponentContext {
    /// Position of the component in its stage's declaration list
    pub index: usize,

    /// Component kind
    pub kind: ComponentKind,

    /// Type slug that selected the factory
    pub type_name: String,

    /// Unique id within the kind; bundle key for sources
    pub id: String,

    /// Failure of this component does not fail the pipeline
    pub optional: bool,

    /// Execution deadline; `None` waits forever
    pub timeout: Option<Duration>,

    /// Validated, immutable configuration record
    pub config: ConfigRecord,
}

impl ComponentContext {
    /// Build the context of a component instance by running its
    /// `declare_config` hook and validating the raw user configuration.
    ///
    /// Used by the engine on both sides of the process boundary, and by
    /// tests that drive component bodies directly.
    #[allow(clippy::too_many_arguments)]
    pub fn for_component<C>(
        component: &C,
        kind: ComponentKind,
        type_name: &str,
        id: &str,
        index: usize,
        optional: bool,
        timeout: Option<Duration>,
        config: &serde_json::Map<String, Value>,
    ) -> Result<Self>
    where
        C: Component + ?Sized,
    {
        let mut configurator = Configurator::new();
        component.declare_config(&mut configurator)?;
        let config = configurator.validate(config)?;
        Ok(Self {
            index,
            kind,
            type_name: type_name.to_string(),
            id: id.to_string(),
            optional,
            timeout,
            config,
        })
    }
}

impl fmt::Display for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}.{}.{}",
            self.index, self.kind, self.type_name, self.id
        )
    }
}

/// Base trait of all component kinds
pub trait Component: Send + Sync {
    /// Declare the configuration options of this component.
    ///
    /// Called once per instantiation, before the user configuration is
    /// validated. Components without options keep the default no-op.
    fn declare_config(&self, _config: &mut Configurator) -> Result<()> {
        Ok(())
    }
}

/// A data collector. Its output becomes the bundle entry under its id.
#[async_trait]
pub trait Source: Component {
    /// Collect arbitrary data.
    ///
    /// Must return a non-empty mapping; anything else fails the execution
    /// with [`crate::Error::SourceProducedInvalid`].
    async fn collect(&self, ctx: &ComponentContext) -> Result<Bundle>;
}

/// A bundle transformer. Aggregators run sequentially in declared order.
#[async_trait]
pub trait Aggregator: Component {
    /// Analyse or restructure the collected data in place.
    async fn accumulate(&self, ctx: &ComponentContext, data: &mut Bundle) -> Result<()>;
}

/// A data distributor. Sinks run concurrently and must not rely on each
/// other; the received bundle is a process-local copy.
#[async_trait]
pub trait Sink: Component {
    /// Distribute the collected data.
    async fn distribute(&self, ctx: &ComponentContext, data: &Bundle) -> Result<()>;
}

/// Terminal classification of one component execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The child delivered a result
    Succeeded,
    /// The child delivered the crash sentinel (component error)
    Crashed,
    /// The child died without delivering a result (signal, OOM, segfault)
    Killed,
    /// The child outlived its deadline and survived termination
    Hanged,
    /// The child outlived its deadline and was terminated
    TimedOut,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Crashed => "crashed",
            ExecutionStatus::Killed => "killed",
            ExecutionStatus::Hanged => "hanged",
            ExecutionStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution information of one component run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionInfo {
    /// Terminal status of the execution
    pub status: ExecutionStatus,

    /// Seconds the component body ran. Absent when the child was killed
    /// before producing a result or hanged.
    pub duration_seconds: Option<f64>,

    /// OS process id of the child
    pub process_id: Option<u32>,

    /// Exit code of the child. Absent while the child has not been reaped,
    /// in particular when it hanged.
    pub exit_code: Option<i32>,

    /// Data returned by the child, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for ExecutionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution of PID ")?;
        match self.process_id {
            Some(pid) => write!(f, "{}", pid)?,
            None => write!(f, "<unknown>")?,
        }
        write!(f, " {}", self.status)?;
        match self.exit_code {
            Some(code) => write!(f, ", exit code {}", code)?,
            None => write!(f, ", exit code unknown")?,
        }
        match self.duration_seconds {
            Some(duration) => write!(f, ", ran for {:.4} seconds", duration),
            None => write!(f, ", duration unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(ComponentKind::Source.as_str(), "source");
        assert_eq!(ComponentKind::Aggregator.plural(), "aggregators");
        assert_eq!(format!("{}", ComponentKind::Sink), "sink");
    }

    #[test]
    fn test_kind_serde_snake_case() {
        let kind: ComponentKind = serde_json::from_str("\"aggregator\"").unwrap();
        assert_eq!(kind, ComponentKind::Aggregator);
        assert_eq!(
            serde_json::to_string(&ComponentKind::Source).unwrap(),
            "\"source\""
        );
    }

    #[test]
    fn test_status_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::TimedOut).unwrap(),
            "\"timed_out\""
        );
        let status: ExecutionStatus = serde_json::from_str("\"hanged\"").unwrap();
        assert_eq!(status, ExecutionStatus::Hanged);
    }

    #[test]
    fn test_execution_info_display() {
        let info = ExecutionInfo {
            status: ExecutionStatus::Succeeded,
            duration_seconds: Some(0.25),
            process_id: Some(42),
            exit_code: Some(0),
            data: None,
        };
        let rendered = format!("{}", info);
        assert!(rendered.contains("PID 42"));
        assert!(rendered.contains("succeeded"));
        assert!(rendered.contains("0.2500 seconds"));
    }
}
