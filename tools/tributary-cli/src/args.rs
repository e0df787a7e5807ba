//! Argument parsing for the `tributary` binary.

use std::path::PathBuf;

use clap::Parser;

/// Executes user-defined data-gathering pipelines
#[derive(Parser, Debug)]
#[command(name = "tributary")]
#[command(author, version)]
#[command(about = "Executes user-defined pipelines for data gathering, \
                   transformation and publishing")]
pub struct Args {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Validate the pipeline and exit without running it
    #[arg(short = 'd', long = "dry-run")]
    pub dry_run: bool,

    /// KEY=VALUE pairs for dynamic pipeline templates
    #[arg(short = 'a', long = "values", value_name = "KEY=VALUE")]
    pub values: Vec<String>,

    /// Files with values for dynamic pipeline templates
    #[arg(short = 'f', long = "values-file", value_name = "FILE")]
    pub values_files: Vec<PathBuf>,

    /// Write the run journal to this path instead of the temp directory
    #[arg(short = 'j', long = "journal", value_name = "FILE")]
    pub journal: Option<PathBuf>,

    /// Path to the pipeline definition file (.toml, .json, .yaml)
    #[arg(value_name = "PIPELINE")]
    pub pipeline: PathBuf,
}
