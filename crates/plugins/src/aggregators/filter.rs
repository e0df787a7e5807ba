//! Filter aggregator: prunes the bundle with include/exclude patterns.
//!
//! Patterns match dotted key paths, so `coverage.files` removes the
//! `files` subtree of the `coverage` entry while keeping its siblings.
//!
//! ```toml
//! [[aggregators]]
//! type = "filter"
//! id = "trim"
//!
//!     [aggregators.config]
//!     include = ["*"]
//!     exclude = ["coverage.files"]
//! ```

use async_trait::async_trait;
use serde_json::json;
use tributary_core::builtin_aggregator;
use tributary_core::component::{Aggregator, Bundle, Component, ComponentContext};
use tributary_core::config::{ConfigOption, Configurator, Schema};
use tributary_core::Result;

use crate::filter::{compile_patterns, filter_map};

#[derive(Debug, Default)]
pub struct FilterAggregator;

impl Component for FilterAggregator {
    fn declare_config(&self, config: &mut Configurator) -> Result<()> {
        config.declare(
            ConfigOption::new("include")
                .optional()
                .default(json!(["*"]))
                .schema(Schema::list().items(Schema::string().non_empty())),
        )?;
        config.declare(
            ConfigOption::new("exclude")
                .optional()
                .default(json!([]))
                .schema(Schema::list().items(Schema::string().non_empty())),
        )?;
        Ok(())
    }
}

#[async_trait]
impl Aggregator for FilterAggregator {
    async fn accumulate(&self, ctx: &ComponentContext, data: &mut Bundle) -> Result<()> {
        let include = compile_patterns(ctx.config.get_list("include")?)?;
        let exclude = compile_patterns(ctx.config.get_list("exclude")?)?;

        let filtered = filter_map(data, &include, &exclude);
        *data = filtered;
        Ok(())
    }
}

builtin_aggregator!("filter", FilterAggregator);
