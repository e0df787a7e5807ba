//! Pipeline definition loading: format detection, parsing, variable
//! substitution and structural validation.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tributary_core::definition::PipelineDefinition;

use crate::namespaces::Namespaces;

/// Load, substitute and validate a pipeline definition file
pub fn load_pipeline(path: &Path) -> Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;

    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let raw: Value = match extension.as_str() {
        "toml" => toml::from_str(&content)
            .with_context(|| format!("unable to parse {}", path.display()))?,
        "json" => serde_json::from_str(&content)
            .with_context(|| format!("unable to parse {}", path.display()))?,
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .with_context(|| format!("unable to parse {}", path.display()))?,
        other => bail!(
            "unknown pipeline format {:?}, supported formats are .json, .toml, .yaml",
            other
        ),
    };

    let namespaces = Namespaces::gather(path);
    let substituted = namespaces
        .substitute(&raw)
        .with_context(|| format!("unable to realize {}", path.display()))?;

    let definition = PipelineDefinition::from_value(substituted)?;
    tracing::info!("Pipeline definition loaded, realized and validated");
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (directory, path)
    }

    #[test]
    fn test_load_json_pipeline() {
        let (_dir, path) = write(
            "pipeline.json",
            r#"{
                "sources": [{"type": "timestamp", "id": "ts"}],
                "sinks": [{"type": "print", "id": "out"}]
            }"#,
        );

        let definition = load_pipeline(&path).unwrap();
        assert_eq!(definition.sources[0].type_name, "timestamp");
    }

    #[test]
    fn test_load_toml_pipeline() {
        let (_dir, path) = write(
            "pipeline.toml",
            r#"
[[sources]]
type = "timestamp"
id = "ts"

    [sources.config]
    epoch = true

[[sinks]]
type = "print"
id = "out"
"#,
        );

        let definition = load_pipeline(&path).unwrap();
        assert_eq!(definition.sources[0].config["epoch"], serde_json::json!(true));
    }

    #[test]
    fn test_load_yaml_pipeline() {
        let (_dir, path) = write(
            "pipeline.yaml",
            "sources:\n  - type: timestamp\n    id: ts\nsinks:\n  - type: print\n    id: out\n",
        );

        let definition = load_pipeline(&path).unwrap();
        assert_eq!(definition.sinks[0].type_name, "print");
    }

    #[test]
    fn test_unknown_format_fails() {
        let (_dir, path) = write("pipeline.ini", "[sources]");
        let err = load_pipeline(&path).unwrap_err();
        assert!(err.to_string().contains("unknown pipeline format"));
    }

    #[test]
    fn test_substitution_applies_to_config_values() {
        std::env::set_var("TRIBUTARY_INPUT_TEST", "/tmp/out.json");
        let (_dir, path) = write(
            "pipeline.json",
            r#"{
                "sources": [{"type": "timestamp", "id": "ts"}],
                "sinks": [{
                    "type": "archive",
                    "id": "out",
                    "config": {"output": "{env.TRIBUTARY_INPUT_TEST}"}
                }]
            }"#,
        );

        let definition = load_pipeline(&path).unwrap();
        assert_eq!(
            definition.sinks[0].config["output"],
            serde_json::json!("/tmp/out.json")
        );
    }

    #[test]
    fn test_invalid_structure_fails() {
        let (_dir, path) = write("pipeline.json", r#"{"sources": [], "sinks": []}"#);
        assert!(load_pipeline(&path).is_err());
    }
}
