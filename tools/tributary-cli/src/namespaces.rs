//! Variable namespaces for pipeline definition substitution.
//!
//! String values (and keys) in a pipeline definition may reference
//! `{env.NAME}`, `{pipeline.dir|ext|file|name}` and
//! `{git.root|branch|rev}`. Only environment variables whose names are
//! valid slugs are exposed; git values come from running the `git` binary
//! next to the pipeline file and are only available inside a repository.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::Value;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{(env|pipeline|git)\.([A-Za-z_][A-Za-z0-9_]*)\}")
            .expect("reference pattern is valid")
    })
}

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(tributary_core::config::SLUG_PATTERN).expect("slug pattern is valid")
    })
}

/// Resolved substitution namespaces for one pipeline file
pub struct Namespaces {
    env: HashMap<String, String>,
    pipeline: HashMap<&'static str, String>,
    git: Option<HashMap<&'static str, String>>,
}

impl Namespaces {
    /// Gather the namespaces relative to the pipeline definition file
    pub fn gather(path: &Path) -> Self {
        let env: HashMap<String, String> = std::env::vars()
            .filter(|(name, _)| slug_pattern().is_match(name))
            .collect();

        let mut pipeline = HashMap::new();
        pipeline.insert(
            "dir",
            path.parent()
                .map(|parent| parent.display().to_string())
                .unwrap_or_default(),
        );
        pipeline.insert(
            "ext",
            path.extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default(),
        );
        pipeline.insert(
            "file",
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        pipeline.insert(
            "name",
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        let git = gather_git(path);

        Self {
            env,
            pipeline,
            git,
        }
    }

    fn resolve(&self, namespace: &str, name: &str) -> Result<&str> {
        match namespace {
            "env" => self
                .env
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| anyhow!("environment variable {} is not available", name)),
            "pipeline" => self
                .pipeline
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| anyhow!("unknown pipeline variable {}", name)),
            "git" => match &self.git {
                Some(git) => git
                    .get(name)
                    .map(String::as_str)
                    .ok_or_else(|| anyhow!("unknown git variable {}", name)),
                None => Err(anyhow!(
                    "git information is unavailable for this pipeline"
                )),
            },
            other => Err(anyhow!("unknown namespace {}", other)),
        }
    }

    fn replace(&self, text: &str) -> Result<String> {
        let mut result = String::with_capacity(text.len());
        let mut cursor = 0;
        for captures in reference_pattern().captures_iter(text) {
            let whole = captures.get(0).expect("capture 0 always present");
            result.push_str(&text[cursor..whole.start()]);
            result.push_str(self.resolve(&captures[1], &captures[2])?);
            cursor = whole.end();
        }
        result.push_str(&text[cursor..]);
        Ok(result)
    }

    /// Substitute references in every string key and value of the parsed
    /// definition
    pub fn substitute(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(text) => Ok(Value::String(self.replace(text)?)),
            Value::Array(elements) => elements
                .iter()
                .map(|element| self.substitute(element))
                .collect::<Result<Vec<Value>>>()
                .map(Value::Array),
            Value::Object(entries) => {
                let mut substituted = serde_json::Map::new();
                for (key, entry) in entries {
                    substituted.insert(self.replace(key)?, self.substitute(entry)?);
                }
                Ok(Value::Object(substituted))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Ask the `git` binary about the repository containing the pipeline file
fn gather_git(path: &Path) -> Option<HashMap<&'static str, String>> {
    let parent = path.parent()?;

    let run = |args: &[&str]| -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(parent)
            .args(args)
            .output()
            .ok()?;
        if !output.status.success() {
            tracing::debug!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    };

    let mut git = HashMap::new();
    git.insert("root", run(&["rev-parse", "--show-toplevel"])?);
    git.insert("branch", run(&["rev-parse", "--abbrev-ref", "HEAD"])?);
    git.insert("rev", run(&["rev-parse", "--short", "--verify", "HEAD"])?);
    Some(git)
}
