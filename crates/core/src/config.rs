//! Component configuration: option declaration, schema validation and the
//! frozen configuration record.
//!
//! Components declare options against a [`Configurator`]; the engine
//! validates the user-supplied mapping once, before any child process is
//! spawned, and freezes the result into an immutable [`ConfigRecord`].
//! Secret options are redacted in every log line and error message.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Pattern every option key, component type and component id must match
pub const SLUG_PATTERN: &str = "^[A-Za-z_][A-Za-z0-9_]*$";

/// Placeholder substituted for secret values in logs and errors
pub const SECRET_PLACEHOLDER: &str = "********";

pub(crate) fn is_slug(value: &str) -> bool {
    static SLUG: OnceLock<Regex> = OnceLock::new();
    SLUG.get_or_init(|| Regex::new(SLUG_PATTERN).expect("slug pattern is valid"))
        .is_match(value)
}

/// Value type accepted by a [`Schema`] node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Dict,
}

impl SchemaType {
    fn as_str(&self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Integer => "integer",
            SchemaType::Float => "float",
            SchemaType::Boolean => "boolean",
            SchemaType::List => "list",
            SchemaType::Dict => "dict",
        }
    }
}

/// Input normalisation applied before validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Integer seconds, or a human duration string such as `"1h 30m"`
    Timedelta,
    /// Like [`Coercion::Timedelta`] but passes `null` through
    TimedeltaNullable,
}

/// Declarative value schema for a single option.
///
/// A typed rendition of the usual schema-dictionary language: value type,
/// emptiness and nullability, numeric bounds, string patterns, enumerated
/// values, and recursive rules for list elements and dict keys/values.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    kind: Option<SchemaType>,
    nullable: bool,
    empty: Option<bool>,
    min: Option<f64>,
    max: Option<f64>,
    regex: Option<String>,
    allowed: Option<Vec<Value>>,
    items: Option<Box<Schema>>,
    keys_rules: Option<Box<Schema>>,
    values_rules: Option<Box<Schema>>,
    coerce: Option<Coercion>,
}

impl Schema {
    /// Schema with no constraints; accepts any value
    pub fn any() -> Self {
        Self::default()
    }

    pub fn string() -> Self {
        Self {
            kind: Some(SchemaType::String),
            ..Self::default()
        }
    }

    pub fn integer() -> Self {
        Self {
            kind: Some(SchemaType::Integer),
            ..Self::default()
        }
    }

    pub fn float() -> Self {
        Self {
            kind: Some(SchemaType::Float),
            ..Self::default()
        }
    }

    pub fn boolean() -> Self {
        Self {
            kind: Some(SchemaType::Boolean),
            ..Self::default()
        }
    }

    pub fn list() -> Self {
        Self {
            kind: Some(SchemaType::List),
            ..Self::default()
        }
    }

    pub fn dict() -> Self {
        Self {
            kind: Some(SchemaType::Dict),
            ..Self::default()
        }
    }

    /// Allow `null` in place of a value
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Reject empty strings, lists or dicts
    pub fn non_empty(mut self) -> Self {
        self.empty = Some(false);
        self
    }

    /// Inclusive lower bound for numbers
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Inclusive upper bound for numbers
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Full-match pattern for strings
    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.regex = Some(pattern.into());
        self
    }

    /// Restrict the value to an enumerated set
    pub fn allowed(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.allowed = Some(values.into_iter().collect());
        self
    }

    /// Schema applied to every list element
    pub fn items(mut self, schema: Schema) -> Self {
        self.items = Some(Box::new(schema));
        self
    }

    /// Schema applied to every dict key (as a string value)
    pub fn keys(mut self, schema: Schema) -> Self {
        self.keys_rules = Some(Box::new(schema));
        self
    }

    /// Schema applied to every dict value
    pub fn values(mut self, schema: Schema) -> Self {
        self.values_rules = Some(Box::new(schema));
        self
    }

    /// Coerce integer seconds or a human duration string into seconds
    pub fn coerce_timedelta(mut self) -> Self {
        self.coerce = Some(Coercion::Timedelta);
        self
    }

    /// Like [`Schema::coerce_timedelta`] but passes `null` through
    pub fn coerce_timedelta_nullable(mut self) -> Self {
        self.coerce = Some(Coercion::TimedeltaNullable);
        self
    }

    /// Validate a value, returning the (possibly coerced) result or the list
    /// of constraint violations.
    pub fn validate(&self, value: &Value) -> std::result::Result<Value, Vec<String>> {
        let mut errors = Vec::new();
        let value = match self.coerce_value(value) {
            Ok(value) => value,
            Err(detail) => return Err(vec![detail]),
        };

        if value.is_null() {
            if self.nullable {
                return Ok(value);
            }
            return Err(vec!["null value is not allowed".to_string()]);
        }

        let value = match self.check_type(value, &mut errors) {
            Some(value) => value,
            None => return Err(errors),
        };

        self.check_empty(&value, &mut errors);
        self.check_bounds(&value, &mut errors);
        self.check_regex(&value, &mut errors);
        self.check_allowed(&value, &mut errors);

        if errors.is_empty() {
            Ok(value)
        } else {
            Err(errors)
        }
    }

    fn coerce_value(&self, value: &Value) -> std::result::Result<Value, String> {
        match self.coerce {
            None => Ok(value.clone()),
            Some(Coercion::TimedeltaNullable) if value.is_null() => Ok(Value::Null),
            Some(Coercion::Timedelta) | Some(Coercion::TimedeltaNullable) => match value {
                Value::Number(n) => match n.as_u64() {
                    Some(seconds) => Ok(Value::from(seconds)),
                    None => Err(format!("invalid duration {}", n)),
                },
                Value::String(text) => match humantime::parse_duration(text) {
                    Ok(duration) => Ok(Value::from(duration.as_secs())),
                    Err(err) => Err(format!("unable to parse duration {:?}: {}", text, err)),
                },
                other => Err(format!("unable to parse duration from {}", type_name(other))),
            },
        }
    }

    fn check_type(&self, value: Value, errors: &mut Vec<String>) -> Option<Value> {
        let Some(kind) = self.kind else {
            return Some(value);
        };

        let mismatch = |errors: &mut Vec<String>, value: &Value| {
            errors.push(format!(
                "expected {}, got {}",
                kind.as_str(),
                type_name(value)
            ));
            None
        };

        match kind {
            SchemaType::String => match value {
                Value::String(_) => Some(value),
                other => mismatch(errors, &other),
            },
            SchemaType::Boolean => match value {
                Value::Bool(_) => Some(value),
                other => mismatch(errors, &other),
            },
            SchemaType::Integer => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Some(value),
                // Integral floats are accepted and narrowed
                Value::Number(n) => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Some(Value::from(f as i64)),
                    _ => mismatch(errors, &value),
                },
                other => mismatch(errors, other),
            },
            SchemaType::Float => match &value {
                Value::Number(_) => Some(value),
                other => mismatch(errors, other),
            },
            SchemaType::List => match value {
                Value::Array(elements) => {
                    let mut validated = Vec::with_capacity(elements.len());
                    for (position, element) in elements.iter().enumerate() {
                        match self.items.as_deref() {
                            Some(schema) => match schema.validate(element) {
                                Ok(element) => validated.push(element),
                                Err(nested) => {
                                    for detail in nested {
                                        errors.push(format!("[{}]: {}", position, detail));
                                    }
                                }
                            },
                            None => validated.push(element.clone()),
                        }
                    }
                    if errors.is_empty() {
                        Some(Value::Array(validated))
                    } else {
                        None
                    }
                }
                other => mismatch(errors, &other),
            },
            SchemaType::Dict => match value {
                Value::Object(entries) => {
                    let mut validated = Map::new();
                    for (key, entry) in entries.iter() {
                        if let Some(schema) = self.keys_rules.as_deref() {
                            if let Err(nested) = schema.validate(&Value::from(key.clone())) {
                                for detail in nested {
                                    errors.push(format!("key {:?}: {}", key, detail));
                                }
                            }
                        }
                        match self.values_rules.as_deref() {
                            Some(schema) => match schema.validate(entry) {
                                Ok(entry) => {
                                    validated.insert(key.clone(), entry);
                                }
                                Err(nested) => {
                                    for detail in nested {
                                        errors.push(format!("{}: {}", key, detail));
                                    }
                                }
                            },
                            None => {
                                validated.insert(key.clone(), entry.clone());
                            }
                        }
                    }
                    if errors.is_empty() {
                        Some(Value::Object(validated))
                    } else {
                        None
                    }
                }
                other => mismatch(errors, &other),
            },
        }
    }

    fn check_empty(&self, value: &Value, errors: &mut Vec<String>) {
        if self.empty != Some(false) {
            return;
        }
        let is_empty = match value {
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        };
        if is_empty {
            errors.push("empty values are not allowed".to_string());
        }
    }

    fn check_bounds(&self, value: &Value, errors: &mut Vec<String>) {
        let Some(number) = value.as_f64() else {
            return;
        };
        if let Some(min) = self.min {
            if number < min {
                errors.push(format!("value {} is below minimum {}", number, min));
            }
        }
        if let Some(max) = self.max {
            if number > max {
                errors.push(format!("value {} is above maximum {}", number, max));
            }
        }
    }

    fn check_regex(&self, value: &Value, errors: &mut Vec<String>) {
        let (Some(pattern), Some(text)) = (self.regex.as_deref(), value.as_str()) else {
            return;
        };
        match Regex::new(pattern) {
            Ok(regex) if regex.is_match(text) => {}
            Ok(_) => errors.push(format!("value {:?} does not match regex {:?}", text, pattern)),
            Err(err) => errors.push(format!("invalid regex {:?}: {}", pattern, err)),
        }
    }

    fn check_allowed(&self, value: &Value, errors: &mut Vec<String>) {
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                errors.push(format!("value {} is not an allowed value", value));
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Declaration of a single configuration option
#[derive(Debug, Clone)]
pub struct ConfigOption {
    key: String,
    default: Value,
    optional: bool,
    schema: Option<Schema>,
    secret: bool,
}

impl ConfigOption {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            default: Value::Null,
            optional: false,
            schema: None,
            secret: false,
        }
    }

    /// Value used when the option is optional and absent
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Mark the option as not mandatory
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Schema the user value is validated against
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Mark the value as a secret: it must never reach logs or journals
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// One frozen configuration value
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigItem {
    pub value: Value,
    pub secret: bool,
}

/// Immutable component configuration produced by [`Configurator::validate`].
///
/// Iteration order is declaration order. Typed accessors fail with
/// [`Error::Component`] when the key is absent or of the wrong type, which
/// indicates a mismatch between a component's declarations and its body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigRecord {
    items: Vec<(String, ConfigItem)>,
}

impl ConfigRecord {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigItem)> {
        self.items.iter().map(|(key, item)| (key.as_str(), item))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, item)| &item.value)
    }

    pub fn is_secret(&self, key: &str) -> bool {
        self.items
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, item)| item.secret)
            .unwrap_or(false)
    }

    fn require(&self, key: &str, expected: &str) -> Result<&Value> {
        match self.get(key) {
            Some(value) => Ok(value),
            None => Err(Error::Component(format!(
                "config option {} ({}) is not present in the record",
                key, expected
            ))),
        }
    }

    fn type_error(&self, key: &str, expected: &str, value: &Value) -> Error {
        let rendered = if self.is_secret(key) {
            SECRET_PLACEHOLDER.to_string()
        } else {
            value.to_string()
        };
        Error::Component(format!(
            "config option {} is not a {}: {}",
            key, expected, rendered
        ))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.require(key, "boolean")?;
        value
            .as_bool()
            .ok_or_else(|| self.type_error(key, "boolean", value))
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        let value = self.require(key, "integer")?;
        value
            .as_i64()
            .ok_or_else(|| self.type_error(key, "integer", value))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        let value = self.require(key, "float")?;
        value
            .as_f64()
            .ok_or_else(|| self.type_error(key, "float", value))
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        let value = self.require(key, "string")?;
        value
            .as_str()
            .ok_or_else(|| self.type_error(key, "string", value))
    }

    /// String accessor for nullable options: `null` becomes `None`
    pub fn get_opt_str(&self, key: &str) -> Result<Option<&str>> {
        let value = self.require(key, "string or null")?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.as_str())),
            other => Err(self.type_error(key, "string or null", other)),
        }
    }

    pub fn get_list(&self, key: &str) -> Result<&Vec<Value>> {
        let value = self.require(key, "list")?;
        value
            .as_array()
            .ok_or_else(|| self.type_error(key, "list", value))
    }

    pub fn get_map(&self, key: &str) -> Result<&Map<String, Value>> {
        let value = self.require(key, "dict")?;
        value
            .as_object()
            .ok_or_else(|| self.type_error(key, "dict", value))
    }
}

impl fmt::Display for ConfigRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, item) in self.iter() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            if item.secret {
                write!(f, "{} = {}", key, SECRET_PLACEHOLDER)?;
            } else {
                write!(f, "{} = {}", key, item.value)?;
            }
        }
        Ok(())
    }
}

/// Whole-record validation function. May mutate or delete keys.
pub type RecordValidator = Box<dyn Fn(&mut Map<String, Value>) -> Result<()> + Send + Sync>;

/// Component configuration options manager.
///
/// Collects option declarations from a component's `declare_config` hook and
/// turns a user-supplied mapping into a frozen [`ConfigRecord`].
#[derive(Default)]
pub struct Configurator {
    declared: Vec<ConfigOption>,
    validators: Vec<RecordValidator>,
}

impl Configurator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an option. Keys must be unique slugs.
    pub fn declare(&mut self, option: ConfigOption) -> Result<()> {
        if !is_slug(&option.key) {
            return Err(Error::InvalidDefinition(format!(
                "invalid config key {:?}, valid keys match {}",
                option.key, SLUG_PATTERN
            )));
        }
        if self.declared.iter().any(|declared| declared.key == option.key) {
            return Err(Error::InvalidDefinition(format!(
                "config key {:?} declared twice",
                option.key
            )));
        }
        self.declared.push(option);
        Ok(())
    }

    /// Register a whole-record validator, run after per-option validation in
    /// registration order.
    pub fn add_validator<F>(&mut self, validator: F)
    where
        F: Fn(&mut Map<String, Value>) -> Result<()> + Send + Sync + 'static,
    {
        self.validators.push(Box::new(validator));
    }

    /// Validate the user configuration against the declared options.
    pub fn validate(&self, userconf: &Map<String, Value>) -> Result<ConfigRecord> {
        if self.declared.is_empty() && userconf.is_empty() {
            return Ok(ConfigRecord::default());
        }

        let missing: Vec<String> = self
            .declared
            .iter()
            .filter(|option| !option.optional && !userconf.contains_key(&option.key))
            .map(|option| option.key.clone())
            .collect();
        if !missing.is_empty() {
            let mut missing = missing;
            missing.sort();
            return Err(Error::MissingOptions(missing));
        }

        let mut unknown: Vec<String> = userconf
            .keys()
            .filter(|key| !self.declared.iter().any(|option| &&option.key == key))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(Error::UnknownOptions(unknown));
        }

        // Assemble values in declaration order, validating and coercing
        // user-provided ones and falling back to defaults.
        let mut validated = Map::new();
        for option in &self.declared {
            let value = match userconf.get(&option.key) {
                Some(value) => match &option.schema {
                    Some(schema) => match schema.validate(value) {
                        Ok(value) => value,
                        Err(details) => {
                            let rendered = if option.secret {
                                SECRET_PLACEHOLDER.to_string()
                            } else {
                                value.to_string()
                            };
                            tracing::error!(
                                "Invalid config option {} = {}: {}",
                                option.key,
                                rendered,
                                details.join("; ")
                            );
                            return Err(Error::InvalidConfigOption {
                                key: option.key.clone(),
                                value: rendered,
                                detail: details.join("; "),
                            });
                        }
                    },
                    None => value.clone(),
                },
                None => option.default.clone(),
            };
            validated.insert(option.key.clone(), value);
        }

        for validator in &self.validators {
            validator(&mut validated)?;
        }

        let is_secret = |key: &str| {
            self.declared
                .iter()
                .find(|option| option.key == key)
                .map(|option| option.secret)
                .unwrap_or(false)
        };

        let items: Vec<(String, ConfigItem)> = validated
            .into_iter()
            .map(|(key, value)| {
                let secret = is_secret(&key);
                (key, ConfigItem { value, secret })
            })
            .collect();
        let record = ConfigRecord { items };

        tracing::info!("Using configuration:\n{}", record);
        Ok(record)
    }
}
