//! Error types for tributary-core

use thiserror::Error;

use crate::component::{ComponentKind, ExecutionInfo};

/// Result type alias for tributary-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tributary-core
#[derive(Debug, Error)]
pub enum Error {
    /// Mandatory configuration options absent from the user configuration
    #[error("Missing mandatory configuration options {0:?}")]
    MissingOptions(Vec<String>),

    /// User configuration contains options that were never declared
    #[error("Unknown configuration options {0:?}")]
    UnknownOptions(Vec<String>),

    /// A configuration option value failed its schema
    #[error("Invalid config option {key} = {value}: {detail}")]
    InvalidConfigOption {
        key: String,
        /// Rendered value; `********` when the option is secret
        value: String,
        detail: String,
    },

    /// No factory registered under this (kind, type) pair
    #[error("Unknown {kind} type: {type_name}")]
    UnknownComponentType {
        kind: ComponentKind,
        type_name: String,
    },

    /// Structurally invalid pipeline definition
    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),

    /// A source returned empty or non-mapping data
    #[error("Source {id} produced empty or non-mapping data")]
    SourceProducedInvalid { id: String },

    /// The child delivered the crash sentinel instead of a result
    #[error("Component crashed: {0}")]
    Crash(ExecutionInfo),

    /// The child missed its execution deadline or died without a result
    #[error("Component execution time exceeded: {0}")]
    TimeExceeded(ExecutionInfo),

    /// A non-optional component failure aborted the stage
    #[error("{stage} stage aborted: {cause}")]
    StageAborted {
        stage: ComponentKind,
        #[source]
        cause: Box<Error>,
    },

    /// The scheduler stopped because a run failed and stop_on_failure is set
    #[error("Scheduler stopped on pipeline failure ({failed} failed runs)")]
    SchedulerStopOnFailure { failed: u64 },

    /// Error raised by a component body
    #[error("Component error: {0}")]
    Component(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
