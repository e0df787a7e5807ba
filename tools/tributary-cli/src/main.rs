//! `tributary` - executes user-defined data-gathering pipelines.
//!
//! ```bash
//! # Run a pipeline once
//! tributary pipeline.toml
//!
//! # Run verbosely and keep the journal at a known place
//! tributary -vv --journal ./journal.json pipeline.toml
//!
//! # Validate without running
//! tributary --dry-run pipeline.toml
//! ```
//!
//! The same binary doubles as the component worker: pipeline hosts
//! re-execute it with the worker marker set, and the entry point dispatches
//! into the worker protocol before anything else happens.

mod args;
mod inputs;
mod logging;
mod namespaces;

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tributary_core::pipeline::{Pipeline, PipelineOptions};
use tributary_core::registry::Registry;
use tributary_core::scheduler::Scheduler;
use tributary_core::worker;

// Linked for its link-time component registrations
use tributary_plugins as _;

use crate::args::Args;

const APP_LABEL: &str = "tributary";

#[tokio::main]
async fn main() -> ExitCode {
    // Worker dispatch comes first: a worker process must never parse the
    // user-facing command line.
    if worker::worker_requested() {
        logging::init_worker();
        let registry = Registry::with_builtins();
        let code = worker::run_worker(&registry).await;
        return ExitCode::from(code.clamp(0, 255) as u8);
    }

    let args = Args::parse();
    logging::init(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    tracing::info!("tributary PID {} starting ...", std::process::id());

    let pipeline_file = args
        .pipeline
        .canonicalize()
        .with_context(|| format!("no such file {}", args.pipeline.display()))?;
    if !pipeline_file.is_file() {
        bail!("no such file {}", pipeline_file.display());
    }

    for pair in &args.values {
        if !pair.contains('=') {
            bail!("invalid value {:?}, expected KEY=VALUE", pair);
        }
    }
    if !args.values.is_empty() || !args.values_files.is_empty() {
        tracing::warn!(
            "--values and --values-file apply to dynamic pipeline templates \
             and do nothing for this pipeline"
        );
    }

    tracing::info!(
        "Loading pipeline definition from {} ...",
        pipeline_file.display()
    );
    let definition = inputs::load_pipeline(&pipeline_file)?;

    let registry = Registry::with_builtins();
    let name = pipeline_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pipeline".to_string());

    tracing::info!("Creating pipeline ...");
    let mut pipeline = Pipeline::new(
        &definition,
        &name,
        &registry,
        PipelineOptions {
            app_label: APP_LABEL.to_string(),
            save_journal: true,
            journal_path: args.journal.clone(),
            launcher: None,
        },
    )?;

    if args.dry_run {
        tracing::info!("Dry run complete! Exiting ...");
        return Ok(());
    }

    match &definition.schedule {
        Some(schedule) => {
            tracing::info!("Creating scheduler for pipeline ...");
            let mut scheduler = Scheduler::new(pipeline, schedule);
            scheduler.run().await?;
        }
        None => {
            pipeline.run().await?;
        }
    }

    Ok(())
}
