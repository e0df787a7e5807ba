//! Archive sink: writes the collected data to a JSON file.
//!
//! ```toml
//! [[sinks]]
//! type = "archive"
//! id = "out"
//!
//!     [sinks.config]
//!     output = "data.json"
//!     override = true
//!     pretty = true
//! ```
//!
//! Inherits the filter-sink options; see the module documentation of
//! [`crate::sinks`].

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};
use tributary_core::builtin_sink;
use tributary_core::component::{Bundle, Component, ComponentContext, Sink};
use tributary_core::config::{ConfigOption, Configurator, Schema};
use tributary_core::{Error, Result};

use super::{apply_filters, declare_filter_options};

#[derive(Debug, Default)]
pub struct ArchiveSink;

impl Component for ArchiveSink {
    fn declare_config(&self, config: &mut Configurator) -> Result<()> {
        declare_filter_options(config)?;

        config.declare(
            ConfigOption::new("output").schema(Schema::string().non_empty()),
        )?;
        config.declare(
            ConfigOption::new("encoding")
                .optional()
                .default(json!("utf-8"))
                .schema(Schema::string().allowed([json!("utf-8"), json!("utf8")])),
        )?;
        config.declare(
            ConfigOption::new("override")
                .optional()
                .default(json!(false))
                .schema(Schema::boolean()),
        )?;
        config.declare(
            ConfigOption::new("create_parents")
                .optional()
                .default(json!(true))
                .schema(Schema::boolean()),
        )?;
        config.declare(
            ConfigOption::new("pretty")
                .optional()
                .default(json!(false))
                .schema(Schema::boolean()),
        )?;
        Ok(())
    }
}

#[async_trait]
impl Sink for ArchiveSink {
    async fn distribute(&self, ctx: &ComponentContext, data: &Bundle) -> Result<()> {
        let filtered = apply_filters(ctx, data)?;
        let outfile = Path::new(ctx.config.get_str("output")?);

        if outfile.is_file() && !ctx.config.get_bool("override")? {
            return Err(Error::Component(format!(
                "file {} already exists",
                outfile.display()
            )));
        }

        // An empty parent means the current directory
        if let Some(parent) = outfile.parent().filter(|p| !p.as_os_str().is_empty()) {
            if ctx.config.get_bool("create_parents")? {
                tokio::fs::create_dir_all(parent).await?;
            } else if !parent.is_dir() {
                return Err(Error::Component(format!(
                    "no such directory {}",
                    parent.display()
                )));
            }
        }

        let payload = Value::Object(filtered);
        let content = if ctx.config.get_bool("pretty")? {
            serde_json::to_string_pretty(&payload)?
        } else {
            serde_json::to_string(&payload)?
        };

        tracing::info!("Archiving data to {}", outfile.display());
        tokio::fs::write(outfile, content).await?;
        Ok(())
    }
}

builtin_sink!("archive", ArchiveSink);
