//! Core engine for Tributary data-gathering pipelines.
//!
//! A pipeline is a batch of three ordered stages: sources collect data,
//! aggregators transform the collected bundle, sinks distribute it. Every
//! component execution runs in its own child process with an individual
//! timeout; the engine coordinates the stages from the parent process,
//! records a journal entry per execution, and can repeat runs on a fixed
//! schedule.
//!
//! # Key Components
//!
//! - [`definition::PipelineDefinition`] - Parsed pipeline description
//! - [`config::Configurator`] - Schema-driven component option validation
//! - [`registry::Registry`] - Resolves component type names to factories
//! - [`host::Host`] - Child-process lifecycle for a single component
//! - [`pipeline::Pipeline`] - One batch run over the three stages
//! - [`scheduler::Scheduler`] - Repeated runs with passed/failed/missed counters
//! - [`worker`] - Child-side entry point of the execution protocol

pub mod component;
pub mod config;
pub mod definition;
pub mod host;
pub mod journal;
pub mod pipeline;
pub mod proctitle;
pub mod registry;
pub mod scheduler;
pub mod stage;
pub mod worker;

mod error;

pub use error::{Error, Result};

// Re-exported for the registration macros expanded in plugin crates.
pub use inventory;
