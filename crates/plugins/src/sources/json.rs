//! JSON source: contents of a local JSON file.
//!
//! The file must contain a JSON object; the parsed mapping becomes the
//! bundle entry.

use async_trait::async_trait;
use serde_json::{json, Value};
use tributary_core::builtin_source;
use tributary_core::component::{Bundle, Component, ComponentContext, Source};
use tributary_core::config::{ConfigOption, Configurator, Schema};
use tributary_core::{Error, Result};

#[derive(Debug, Default)]
pub struct JsonSource;

impl Component for JsonSource {
    fn declare_config(&self, config: &mut Configurator) -> Result<()> {
        config.declare(
            ConfigOption::new("path").schema(Schema::string().non_empty()),
        )?;
        config.declare(
            ConfigOption::new("encoding")
                .optional()
                .default(json!("utf-8"))
                .schema(Schema::string().allowed([json!("utf-8"), json!("utf8")])),
        )?;
        Ok(())
    }
}

#[async_trait]
impl Source for JsonSource {
    async fn collect(&self, ctx: &ComponentContext) -> Result<Bundle> {
        let path = ctx.config.get_str("path")?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| Error::Component(format!("unable to read {}: {}", path, err)))?;

        let parsed: Value = serde_json::from_str(&content)
            .map_err(|err| Error::Component(format!("unable to parse {}: {}", path, err)))?;
        match parsed {
            Value::Object(entry) => Ok(entry),
            other => Err(Error::Component(format!(
                "{} must contain a JSON object, got {}",
                path,
                match other {
                    Value::Array(_) => "an array",
                    Value::String(_) => "a string",
                    Value::Number(_) => "a number",
                    Value::Bool(_) => "a boolean",
                    _ => "null",
                }
            ))),
        }
    }
}

builtin_source!("json", JsonSource);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tributary_core::component::ComponentKind;

    fn context(path: &str) -> ComponentContext {
        let mut config = Map::new();
        config.insert("path".to_string(), json!(path));
        ComponentContext::for_component(
            &JsonSource,
            ComponentKind::Source,
            "json",
            "data",
            0,
            false,
            None,
            &config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_collects_object_content() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("data.json");
        std::fs::write(&path, r#"{"answer": 42, "nested": {"ok": true}}"#).unwrap();

        let ctx = context(path.to_str().unwrap());
        let entry = JsonSource.collect(&ctx).await.unwrap();
        assert_eq!(entry["answer"], json!(42));
        assert_eq!(entry["nested"]["ok"], json!(true));
    }

    #[tokio::test]
    async fn test_non_object_content_fails() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("list.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let ctx = context(path.to_str().unwrap());
        let err = JsonSource.collect(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let ctx = context("/nonexistent/data.json");
        assert!(JsonSource.collect(&ctx).await.is_err());
    }

    #[test]
    fn test_path_is_mandatory() {
        let result = ComponentContext::for_component(
            &JsonSource,
            ComponentKind::Source,
            "json",
            "data",
            0,
            false,
            None,
            &Map::new(),
        );
        assert!(result.is_err());
    }
}
