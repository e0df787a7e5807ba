//! Timestamp source: the current time in selectable representations.
//!
//! ```toml
//! [[sources]]
//! type = "timestamp"
//! id = "ts"
//!
//!     [sources.config]
//!     epoch = true
//!     iso8601 = true
//! ```

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde_json::{json, Value};
use tributary_core::builtin_source;
use tributary_core::component::{Bundle, Component, ComponentContext, Source};
use tributary_core::config::{ConfigOption, Configurator, Schema};
use tributary_core::{Error, Result};

#[derive(Debug, Default)]
pub struct TimestampSource;

impl Component for TimestampSource {
    fn declare_config(&self, config: &mut Configurator) -> Result<()> {
        config.declare(
            ConfigOption::new("epoch")
                .optional()
                .default(json!(true))
                .schema(Schema::boolean()),
        )?;
        config.declare(
            ConfigOption::new("epochf")
                .optional()
                .default(json!(false))
                .schema(Schema::boolean()),
        )?;
        config.declare(
            ConfigOption::new("iso8601")
                .optional()
                .default(json!(false))
                .schema(Schema::boolean()),
        )?;
        config.declare(
            ConfigOption::new("strftime")
                .optional()
                .schema(Schema::string().non_empty().nullable()),
        )?;

        config.add_validator(|record| {
            let enabled = record
                .values()
                .any(|value| value.as_bool().unwrap_or(false) || value.is_string());
            if enabled {
                Ok(())
            } else {
                Err(Error::Component(
                    "the timestamp source requires at least one timestamp format enabled"
                        .to_string(),
                ))
            }
        });
        Ok(())
    }
}

#[async_trait]
impl Source for TimestampSource {
    async fn collect(&self, ctx: &ComponentContext) -> Result<Bundle> {
        let now = Local::now();
        let mut entry = Bundle::new();

        if ctx.config.get_bool("epoch")? {
            entry.insert("epoch".to_string(), json!(now.timestamp()));
        }
        if ctx.config.get_bool("epochf")? {
            let epochf = now.timestamp_micros() as f64 / 1e6;
            entry.insert("epochf".to_string(), json!(epochf));
        }
        if ctx.config.get_bool("iso8601")? {
            entry.insert(
                "iso8601".to_string(),
                json!(now.format("%Y-%m-%dT%H:%M:%S").to_string()),
            );
        }
        if let Some(format) = ctx.config.get_opt_str("strftime")? {
            let items: Vec<Item> = StrftimeItems::new(format).collect();
            if items.iter().any(|item| matches!(item, Item::Error)) {
                return Err(Error::Component(format!(
                    "invalid strftime format {:?}",
                    format
                )));
            }
            entry.insert(
                "strftime".to_string(),
                Value::String(now.format_with_items(items.iter()).to_string()),
            );
        }

        Ok(entry)
    }
}

builtin_source!("timestamp", TimestampSource);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tributary_core::component::ComponentKind;

    fn context(config: Value) -> Result<ComponentContext> {
        let config: Map<String, Value> = config.as_object().cloned().unwrap_or_default();
        ComponentContext::for_component(
            &TimestampSource,
            ComponentKind::Source,
            "timestamp",
            "ts",
            0,
            false,
            None,
            &config,
        )
    }

    #[tokio::test]
    async fn test_epoch_collected_by_default() {
        let ctx = context(json!({})).unwrap();
        let entry = TimestampSource.collect(&ctx).await.unwrap();
        assert!(entry["epoch"].is_i64());
        assert!(!entry.contains_key("epochf"));
        assert!(!entry.contains_key("iso8601"));
    }

    #[tokio::test]
    async fn test_all_formats() {
        let ctx = context(json!({
            "epoch": true,
            "epochf": true,
            "iso8601": true,
            "strftime": "%Y"
        }))
        .unwrap();
        let entry = TimestampSource.collect(&ctx).await.unwrap();

        assert!(entry["epochf"].is_f64());
        let iso = entry["iso8601"].as_str().unwrap();
        assert!(iso.contains('T'), "iso8601 value {:?}", iso);
        assert_eq!(entry["strftime"].as_str().unwrap().len(), 4);
    }

    #[test]
    fn test_all_formats_disabled_is_rejected() {
        let err = context(json!({"epoch": false})).unwrap_err();
        assert!(err.to_string().contains("at least one timestamp format"));
    }

    #[tokio::test]
    async fn test_invalid_strftime_format_fails() {
        let ctx = context(json!({"strftime": "%Q%Q"})).unwrap();
        assert!(TimestampSource.collect(&ctx).await.is_err());
    }
}
