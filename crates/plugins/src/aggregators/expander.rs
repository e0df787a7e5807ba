//! Expander aggregator: splices one entry's children into the bundle top
//! level.
//!
//! With a bundle `{"ts": {"epoch": 1}}`, expanding `ts` yields
//! `{"epoch": 1}`. A child key that already exists at the top level fails
//! the component rather than silently overwriting data.

use async_trait::async_trait;
use serde_json::Value;
use tributary_core::builtin_aggregator;
use tributary_core::component::{Aggregator, Bundle, Component, ComponentContext};
use tributary_core::config::{ConfigOption, Configurator, Schema};
use tributary_core::{Error, Result};

#[derive(Debug, Default)]
pub struct ExpanderAggregator;

impl Component for ExpanderAggregator {
    fn declare_config(&self, config: &mut Configurator) -> Result<()> {
        config.declare(
            ConfigOption::new("key").schema(Schema::string().non_empty()),
        )?;
        Ok(())
    }
}

#[async_trait]
impl Aggregator for ExpanderAggregator {
    async fn accumulate(&self, ctx: &ComponentContext, data: &mut Bundle) -> Result<()> {
        let key = ctx.config.get_str("key")?;

        let Some(value) = data.remove(key) else {
            return Err(Error::Component(format!(
                "key {:?} not present in collected data",
                key
            )));
        };
        let Value::Object(children) = value else {
            return Err(Error::Component(format!(
                "cannot expand {:?}: value is not a mapping",
                key
            )));
        };

        for (child_key, child_value) in children {
            if data.contains_key(&child_key) {
                return Err(Error::Component(format!(
                    "cannot expand {:?}: key {:?} already exists at the top level",
                    key, child_key
                )));
            }
            data.insert(child_key, child_value);
        }
        Ok(())
    }
}

builtin_aggregator!("expander", ExpanderAggregator);
