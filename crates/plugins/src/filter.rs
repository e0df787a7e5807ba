//! Key-path pattern filtering shared by the filter aggregator and the
//! filter-capable sinks.
//!
//! Patterns are shell-style globs matched against dotted key paths, e.g.
//! `coverage.files.*`. A value is kept when its path matches any include
//! pattern and no exclude pattern.

use std::path::Path;

use glob::Pattern;
use serde_json::{Map, Value};
use tributary_core::{Error, Result};

/// Compile glob patterns from a list of JSON string values
pub fn compile_patterns(values: &[Value]) -> Result<Vec<Pattern>> {
    values
        .iter()
        .map(|value| {
            let text = value.as_str().ok_or_else(|| {
                Error::Component(format!("pattern must be a string, got {}", value))
            })?;
            Pattern::new(text)
                .map_err(|err| Error::Component(format!("invalid pattern {:?}: {}", text, err)))
        })
        .collect()
}

/// Whether `value` matches any of the patterns
pub fn included_in(value: &str, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches(value))
}

/// Whether `value` matches the include list and not the exclude list
pub fn is_wanted(value: &str, include: &[Pattern], exclude: &[Pattern]) -> bool {
    included_in(value, include) && !included_in(value, exclude)
}

/// Filter a mapping recursively by dotted key paths
pub fn filter_map(
    data: &Map<String, Value>,
    include: &[Pattern],
    exclude: &[Pattern],
) -> Map<String, Value> {
    fn recurse(
        breadcrumbs: &str,
        element: &Map<String, Value>,
        include: &[Pattern],
        exclude: &[Pattern],
    ) -> Map<String, Value> {
        let mut filtered = Map::new();
        for (key, value) in element {
            let path = if breadcrumbs.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", breadcrumbs, key)
            };
            if !is_wanted(&path, include, exclude) {
                continue;
            }
            let value = match value {
                Value::Object(nested) => Value::Object(recurse(&path, nested, include, exclude)),
                other => other.clone(),
            };
            filtered.insert(key.clone(), value);
        }
        filtered
    }

    recurse("", data, include, exclude)
}

/// Load a ".gitignore"-like pattern file: one pattern per line, blank lines
/// and `#` comments ignored, duplicates dropped, order preserved.
pub fn load_pattern_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|err| {
        Error::Component(format!("unable to read pattern file {}: {}", path.display(), err))
    })?;

    let mut patterns: Vec<String> = Vec::new();
    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || patterns.iter().any(|seen| seen == line) {
            continue;
        }
        patterns.push(line.to_string());
    }
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn patterns(values: &[&str]) -> Vec<Pattern> {
        values.iter().map(|p| Pattern::new(p).unwrap()).collect()
    }

    #[test]
    fn test_included_in() {
        let include = patterns(&["coverage.*", "build"]);
        assert!(included_in("coverage.total", &include));
        assert!(included_in("build", &include));
        assert!(!included_in("timestamp", &include));
    }

    #[test]
    fn test_is_wanted() {
        let include = patterns(&["*"]);
        let exclude = patterns(&["*SECRET*"]);
        assert!(is_wanted("PATH", &include, &exclude));
        assert!(!is_wanted("MY_SECRET_KEY", &include, &exclude));
    }

    #[test]
    fn test_filter_map_prunes_nested_paths() {
        let data = json!({
            "my_source": {
                "my_value1": 1000,
                "my_value2": 2000,
                "other_value": "hello"
            },
            "coverage": {
                "files": {"main.rs": 0.5},
                "total": 0.37
            }
        });
        let data = data.as_object().unwrap();

        let filtered = filter_map(
            data,
            &patterns(&["*"]),
            &patterns(&["my_source.my_value*", "coverage.files"]),
        );

        assert_eq!(
            serde_json::Value::Object(filtered),
            json!({
                "my_source": {"other_value": "hello"},
                "coverage": {"total": 0.37}
            })
        );
    }

    #[test]
    fn test_filter_map_empty_include_drops_everything() {
        let data = json!({"a": 1, "b": 2});
        let filtered = filter_map(data.as_object().unwrap(), &[], &[]);
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_load_pattern_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# include everything interesting").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "coverage.*").unwrap();
        writeln!(file, "build").unwrap();
        writeln!(file, "coverage.*").unwrap();
        file.flush().unwrap();

        let loaded = load_pattern_file(file.path()).unwrap();
        assert_eq!(loaded, vec!["coverage.*".to_string(), "build".to_string()]);
    }

    #[test]
    fn test_load_pattern_file_missing() {
        assert!(load_pattern_file("/nonexistent/patterns.txt").is_err());
    }

    #[test]
    fn test_compile_patterns_rejects_non_strings() {
        assert!(compile_patterns(&[json!(42)]).is_err());
        assert!(compile_patterns(&[json!("ok*")]).is_ok());
    }
}
