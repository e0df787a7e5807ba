//! Pipeline definition parsing and validation.
//!
//! The definition arrives as already-parsed JSON-compatible data (the CLI
//! handles TOML/JSON/YAML and variable substitution) and is validated here
//! for structure: non-empty source and sink lists, slug-shaped type names,
//! ids and config keys, unique ids per kind, and sane schedule values.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::component::ComponentKind;
use crate::config::{is_slug, SLUG_PATTERN};
use crate::{Error, Result};

/// Pipeline definition: an optional schedule and the three component lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Scheduling block; absent means a single run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleDefinition>,

    /// Data collectors; must not be empty
    pub sources: Vec<ComponentDescriptor>,

    /// Bundle transformers; may be empty
    #[serde(default, deserialize_with = "null_to_default")]
    pub aggregators: Vec<ComponentDescriptor>,

    /// Data distributors; must not be empty
    pub sinks: Vec<ComponentDescriptor>,
}

/// One component entry in the pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Type slug selecting the factory
    #[serde(rename = "type")]
    pub type_name: String,

    /// Unique id within the component's kind
    pub id: String,

    /// Failure of this component does not fail the pipeline
    #[serde(default)]
    pub optional: bool,

    /// Execution deadline; absent or null waits forever.
    /// Accepts integer seconds or a human duration string ("90s", "1h 30m").
    #[serde(
        default,
        deserialize_with = "deserialize_opt_duration",
        serialize_with = "serialize_opt_duration"
    )]
    pub timeout: Option<Duration>,

    /// Free-form component configuration
    #[serde(default, deserialize_with = "null_to_default")]
    pub config: Map<String, Value>,
}

/// Scheduling block of the pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    /// Sampling period. Accepts integer seconds or a human duration string.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub frequency: Duration,

    /// Number of successful runs to take before stopping; absent or null
    /// keeps sampling forever
    #[serde(default)]
    pub samples: Option<u64>,

    /// Epoch seconds of the first run; must be in the future when supplied
    #[serde(default)]
    pub start: Option<u64>,

    /// Stop the scheduler on the first failed run
    #[serde(default)]
    pub stop_on_failure: bool,
}

impl PipelineDefinition {
    /// Parse a definition from JSON-compatible data
    pub fn from_value(value: Value) -> Result<Self> {
        let definition: PipelineDefinition = serde_json::from_value(value)
            .map_err(|err| Error::InvalidDefinition(err.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Validate the definition structure
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::InvalidDefinition(
                "pipeline must declare at least one source".to_string(),
            ));
        }
        if self.sinks.is_empty() {
            return Err(Error::InvalidDefinition(
                "pipeline must declare at least one sink".to_string(),
            ));
        }

        for (kind, descriptors) in [
            (ComponentKind::Source, &self.sources),
            (ComponentKind::Aggregator, &self.aggregators),
            (ComponentKind::Sink, &self.sinks),
        ] {
            let mut seen = std::collections::HashSet::new();
            for descriptor in descriptors {
                descriptor.validate(kind)?;
                if !seen.insert(descriptor.id.as_str()) {
                    return Err(Error::InvalidDefinition(format!(
                        "duplicate {} id: {}",
                        kind, descriptor.id
                    )));
                }
            }
        }

        if let Some(schedule) = &self.schedule {
            if schedule.frequency.is_zero() {
                return Err(Error::InvalidDefinition(
                    "schedule frequency must be greater than zero".to_string(),
                ));
            }
            if schedule.samples == Some(0) {
                return Err(Error::InvalidDefinition(
                    "schedule samples must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl ComponentDescriptor {
    fn validate(&self, kind: ComponentKind) -> Result<()> {
        if !is_slug(&self.type_name) {
            return Err(Error::InvalidDefinition(format!(
                "invalid {} type {:?}, valid types match {}",
                kind, self.type_name, SLUG_PATTERN
            )));
        }
        if !is_slug(&self.id) {
            return Err(Error::InvalidDefinition(format!(
                "invalid {} id {:?}, valid ids match {}",
                kind, self.id, SLUG_PATTERN
            )));
        }
        for key in self.config.keys() {
            if !is_slug(key) {
                return Err(Error::InvalidDefinition(format!(
                    "invalid config key {:?} in {} {}, valid keys match {}",
                    key, kind, self.id, SLUG_PATTERN
                )));
            }
        }
        Ok(())
    }
}

fn null_to_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn parse_duration_value<E: serde::de::Error>(
    value: Value,
) -> std::result::Result<Duration, E> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(Duration::from_secs)
            .ok_or_else(|| E::custom(format!("invalid duration {}", n))),
        Value::String(text) => humantime::parse_duration(&text)
            .map_err(|err| E::custom(format!("unable to parse duration {:?}: {}", text, err))),
        other => Err(E::custom(format!(
            "expected integer seconds or duration string, got {}",
            other
        ))),
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_duration_value(value)
}

fn deserialize_opt_duration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_duration_value(value).map(Some),
    }
}

fn serialize_duration<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

fn serialize_opt_duration<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match duration {
        Some(duration) => serializer.serialize_some(&duration.as_secs()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_definition() {
        let definition = PipelineDefinition::from_value(json!({
            "sources": [{"type": "timestamp", "id": "ts", "config": {"epoch": true}}],
            "sinks": [{"type": "archive", "id": "out", "config": {"output": "/tmp/x.json"}}]
        }))
        .unwrap();

        assert_eq!(definition.sources.len(), 1);
        assert!(definition.aggregators.is_empty());
        assert_eq!(definition.sources[0].type_name, "timestamp");
        assert!(!definition.sources[0].optional);
        assert!(definition.sources[0].timeout.is_none());
    }

    #[test]
    fn test_timeout_accepts_seconds_and_strings() {
        let definition = PipelineDefinition::from_value(json!({
            "sources": [
                {"type": "a", "id": "x", "timeout": 30},
                {"type": "a", "id": "y", "timeout": "1h 30m"},
                {"type": "a", "id": "z", "timeout": null}
            ],
            "sinks": [{"type": "b", "id": "out"}]
        }))
        .unwrap();

        assert_eq!(definition.sources[0].timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            definition.sources[1].timeout,
            Some(Duration::from_secs(5400))
        );
        assert_eq!(definition.sources[2].timeout, None);
    }

    #[test]
    fn test_schedule_frequency_formats() {
        let definition = PipelineDefinition::from_value(json!({
            "schedule": {"frequency": "30s", "samples": 3, "stop_on_failure": true},
            "sources": [{"type": "a", "id": "x"}],
            "sinks": [{"type": "b", "id": "out"}]
        }))
        .unwrap();

        let schedule = definition.schedule.unwrap();
        assert_eq!(schedule.frequency, Duration::from_secs(30));
        assert_eq!(schedule.samples, Some(3));
        assert!(schedule.stop_on_failure);
        assert_eq!(schedule.start, None);
    }

    #[test]
    fn test_empty_sources_rejected() {
        let err = PipelineDefinition::from_value(json!({
            "sources": [],
            "sinks": [{"type": "b", "id": "out"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("at least one source"));
    }

    #[test]
    fn test_empty_sinks_rejected() {
        let err = PipelineDefinition::from_value(json!({
            "sources": [{"type": "a", "id": "x"}],
            "sinks": []
        }))
        .unwrap_err();
        assert!(err.to_string().contains("at least one sink"));
    }

    #[test]
    fn test_duplicate_ids_within_kind_rejected() {
        let err = PipelineDefinition::from_value(json!({
            "sources": [
                {"type": "a", "id": "x"},
                {"type": "other", "id": "x"}
            ],
            "sinks": [{"type": "b", "id": "out"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate source id"));
    }

    #[test]
    fn test_same_id_across_kinds_allowed() {
        assert!(PipelineDefinition::from_value(json!({
            "sources": [{"type": "a", "id": "x"}],
            "sinks": [{"type": "b", "id": "x"}]
        }))
        .is_ok());
    }

    #[test]
    fn test_invalid_slugs_rejected() {
        let err = PipelineDefinition::from_value(json!({
            "sources": [{"type": "bad-type", "id": "x"}],
            "sinks": [{"type": "b", "id": "out"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("bad-type"));

        let err = PipelineDefinition::from_value(json!({
            "sources": [{"type": "a", "id": "x", "config": {"bad-key": 1}}],
            "sinks": [{"type": "b", "id": "out"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("bad-key"));
    }

    #[test]
    fn test_zero_samples_rejected() {
        let err = PipelineDefinition::from_value(json!({
            "schedule": {"frequency": 1, "samples": 0},
            "sources": [{"type": "a", "id": "x"}],
            "sinks": [{"type": "b", "id": "out"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("samples"));
    }
}
