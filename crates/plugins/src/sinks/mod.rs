//! Built-in sinks and the shared filter-sink options.
//!
//! Sinks that call [`declare_filter_options`] from their `declare_config`
//! hook accept four extra options and should pass their input through
//! [`apply_filters`] before distributing it:
//!
//! - `include` - patterns of key paths to keep (default `["*"]`)
//! - `include_files` - pattern files whose entries extend `include`
//! - `exclude` - patterns of key paths to drop (default `[]`)
//! - `exclude_files` - pattern files whose entries extend `exclude`
//!
//! Pattern files are ".gitignore"-like lists: one pattern per line, blank
//! lines and `#` comments ignored.

mod archive;
mod print;

pub use archive::ArchiveSink;
pub use print::PrintSink;

use serde_json::json;
use tributary_core::component::{Bundle, ComponentContext};
use tributary_core::config::{ConfigOption, Configurator, Schema};
use tributary_core::Result;

use crate::filter::{compile_patterns, filter_map, load_pattern_file};

/// Declare the shared filtering options of filter-capable sinks
pub fn declare_filter_options(config: &mut Configurator) -> Result<()> {
    config.declare(
        ConfigOption::new("include")
            .optional()
            .default(json!(["*"]))
            .schema(Schema::list().items(Schema::string())),
    )?;
    config.declare(
        ConfigOption::new("include_files")
            .optional()
            .default(json!([]))
            .schema(Schema::list().items(Schema::string().non_empty())),
    )?;
    config.declare(
        ConfigOption::new("exclude")
            .optional()
            .default(json!([]))
            .schema(Schema::list().items(Schema::string())),
    )?;
    config.declare(
        ConfigOption::new("exclude_files")
            .optional()
            .default(json!([]))
            .schema(Schema::list().items(Schema::string().non_empty())),
    )?;
    Ok(())
}

/// Apply the shared filtering options to the sink's input
pub fn apply_filters(ctx: &ComponentContext, data: &Bundle) -> Result<Bundle> {
    let mut include: Vec<serde_json::Value> = ctx.config.get_list("include")?.clone();
    for file in ctx.config.get_list("include_files")? {
        for pattern in load_pattern_file(file.as_str().unwrap_or_default())? {
            let pattern = json!(pattern);
            if !include.contains(&pattern) {
                include.push(pattern);
            }
        }
    }

    let mut exclude: Vec<serde_json::Value> = ctx.config.get_list("exclude")?.clone();
    for file in ctx.config.get_list("exclude_files")? {
        for pattern in load_pattern_file(file.as_str().unwrap_or_default())? {
            let pattern = json!(pattern);
            if !exclude.contains(&pattern) {
                exclude.push(pattern);
            }
        }
    }

    // Skip the walk when no filtering was requested
    if exclude.is_empty() && include.len() == 1 && include[0] == json!("*") {
        return Ok(data.clone());
    }

    let include = compile_patterns(&include)?;
    let exclude = compile_patterns(&exclude)?;
    Ok(filter_map(data, &include, &exclude))
}
