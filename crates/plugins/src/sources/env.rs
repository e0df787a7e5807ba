//! Environment variable source.
//!
//! Collects variables whose name matches any `include` pattern and no
//! `exclude` pattern. Both lists default to empty, so nothing leaks unless
//! explicitly requested. Values are strings unless a type is assigned
//! through the `types` mapping.
//!
//! ```toml
//! [[sources]]
//! type = "env"
//! id = "build"
//!
//!     [sources.config]
//!     include = ["BUILD_NUMBER", "JOB_NAME"]
//!     lowercase = true
//!
//!     [sources.config.types]
//!     BUILD_NUMBER = "integer"
//! ```

use async_trait::async_trait;
use serde_json::{json, Value};
use tributary_core::builtin_source;
use tributary_core::component::{Bundle, Component, ComponentContext, Source};
use tributary_core::config::{ConfigOption, Configurator, Schema};
use tributary_core::{Error, Result};

use crate::filter::{compile_patterns, is_wanted};

#[derive(Debug, Default)]
pub struct EnvSource;

impl Component for EnvSource {
    fn declare_config(&self, config: &mut Configurator) -> Result<()> {
        config.declare(
            ConfigOption::new("include")
                .optional()
                .default(json!([]))
                .schema(Schema::list().items(Schema::string().non_empty())),
        )?;
        config.declare(
            ConfigOption::new("exclude")
                .optional()
                .default(json!([]))
                .schema(Schema::list().items(Schema::string().non_empty())),
        )?;
        config.declare(
            ConfigOption::new("lowercase")
                .optional()
                .default(json!(true))
                .schema(Schema::boolean()),
        )?;
        config.declare(
            ConfigOption::new("types")
                .optional()
                .default(json!({}))
                .schema(Schema::dict().values(Schema::string().allowed([
                    json!("integer"),
                    json!("float"),
                    json!("string"),
                    json!("boolean"),
                    json!("auto"),
                ]))),
        )?;
        Ok(())
    }
}

#[async_trait]
impl Source for EnvSource {
    async fn collect(&self, ctx: &ComponentContext) -> Result<Bundle> {
        let include = compile_patterns(ctx.config.get_list("include")?)?;
        let exclude = compile_patterns(ctx.config.get_list("exclude")?)?;
        let lowercase = ctx.config.get_bool("lowercase")?;
        let types = ctx.config.get_map("types")?;

        let mut entry = Bundle::new();
        for (name, value) in std::env::vars() {
            if !is_wanted(&name, &include, &exclude) {
                continue;
            }
            let parsed = match types.get(&name).and_then(Value::as_str) {
                Some(kind) => convert(&name, &value, kind)?,
                None => Value::String(value),
            };
            let key = if lowercase { name.to_lowercase() } else { name };
            entry.insert(key, parsed);
        }
        Ok(entry)
    }
}

fn convert(name: &str, value: &str, kind: &str) -> Result<Value> {
    let fail = |expected: &str| {
        Error::Component(format!(
            "environment variable {} is not a valid {}: {:?}",
            name, expected, value
        ))
    };

    match kind {
        "integer" => value
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| fail("integer")),
        "float" => value
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| fail("float")),
        "boolean" => booleanize(value).map(Value::from).ok_or_else(|| fail("boolean")),
        "string" => Ok(Value::from(value)),
        "auto" => Ok(autocast(value)),
        other => Err(Error::Component(format!(
            "unknown type {:?} for environment variable {}",
            other, name
        ))),
    }
}

/// Interpret common textual booleans
fn booleanize(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Best-effort datatype detection: integer, float, boolean, else string
fn autocast(value: &str) -> Value {
    let trimmed = value.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::from(integer);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        return Value::from(float);
    }
    if let Some(boolean) = booleanize(trimmed) {
        return Value::from(boolean);
    }
    Value::from(value)
}

builtin_source!("env", EnvSource);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tributary_core::component::ComponentKind;

    fn context(config: Value) -> ComponentContext {
        let config: Map<String, Value> = config.as_object().cloned().unwrap_or_default();
        ComponentContext::for_component(
            &EnvSource,
            ComponentKind::Source,
            "env",
            "env",
            0,
            false,
            None,
            &config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_collects_only_included_variables() {
        std::env::set_var("TRIBUTARY_ENV_TEST_ONE", "42");
        std::env::set_var("TRIBUTARY_ENV_TEST_TWO", "other");

        let ctx = context(json!({
            "include": ["TRIBUTARY_ENV_TEST_*"],
            "exclude": ["*_TWO"],
            "types": {"TRIBUTARY_ENV_TEST_ONE": "integer"}
        }));
        let entry = EnvSource.collect(&ctx).await.unwrap();

        assert_eq!(entry["tributary_env_test_one"], json!(42));
        assert!(!entry.contains_key("tributary_env_test_two"));
    }

    #[tokio::test]
    async fn test_lowercase_disabled_keeps_names() {
        std::env::set_var("TRIBUTARY_ENV_KEEP_CASE", "x");

        let ctx = context(json!({
            "include": ["TRIBUTARY_ENV_KEEP_CASE"],
            "lowercase": false
        }));
        let entry = EnvSource.collect(&ctx).await.unwrap();
        assert!(entry.contains_key("TRIBUTARY_ENV_KEEP_CASE"));
    }

    #[tokio::test]
    async fn test_default_configuration_collects_nothing() {
        let ctx = context(json!({}));
        let entry = EnvSource.collect(&ctx).await.unwrap();
        // An empty mapping makes the execution fail upstream
        assert!(entry.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_typed_value_fails() {
        std::env::set_var("TRIBUTARY_ENV_NOT_INT", "abc");

        let ctx = context(json!({
            "include": ["TRIBUTARY_ENV_NOT_INT"],
            "types": {"TRIBUTARY_ENV_NOT_INT": "integer"}
        }));
        assert!(EnvSource.collect(&ctx).await.is_err());
    }

    #[test]
    fn test_autocast() {
        assert_eq!(autocast("42"), json!(42));
        assert_eq!(autocast("4.5"), json!(4.5));
        assert_eq!(autocast("yes"), json!(true));
        assert_eq!(autocast("hello"), json!("hello"));
    }

    #[test]
    fn test_booleanize() {
        assert_eq!(booleanize("TRUE"), Some(true));
        assert_eq!(booleanize("off"), Some(false));
        assert_eq!(booleanize("maybe"), None);
    }
}
