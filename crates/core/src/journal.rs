//! Per-run journal: one entry per component execution attempt.
//!
//! The journal is diagnostic, not transactional. It is appended to while a
//! run progresses (failed attempts included) and serialized to a pretty
//! JSON file when the run completes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::component::{ComponentKind, ExecutionInfo, ExecutionStatus};
use crate::{Error, Result};

/// Execution record of one component attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the stage's declaration list
    pub index: usize,

    /// Component id
    pub id: String,

    /// Component kind
    pub kind: ComponentKind,

    /// OS process id of the child, when one was spawned
    pub process_id: Option<u32>,

    /// Terminal status of the execution
    pub status: ExecutionStatus,

    /// Exit code of the child, when observed
    pub exit_code: Option<i32>,

    /// Seconds the component body ran, when known
    pub duration_seconds: Option<f64>,
}

impl JournalEntry {
    /// Build an entry from an execution outcome. Secret config values never
    /// enter the journal: only identity and process metadata are recorded.
    pub fn from_execution(
        index: usize,
        id: &str,
        kind: ComponentKind,
        info: &ExecutionInfo,
    ) -> Self {
        Self {
            index,
            id: id.to_string(),
            kind,
            process_id: info.process_id,
            status: info.status,
            exit_code: info.exit_code,
            duration_seconds: info.duration_seconds,
        }
    }
}

/// Structured record of one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Journal {
    pub sources: Vec<JournalEntry>,
    pub aggregators: Vec<JournalEntry>,
    pub sinks: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable entry list of one stage
    pub fn stage_mut(&mut self, kind: ComponentKind) -> &mut Vec<JournalEntry> {
        match kind {
            ComponentKind::Source => &mut self.sources,
            ComponentKind::Aggregator => &mut self.aggregators,
            ComponentKind::Sink => &mut self.sinks,
        }
    }

    /// Write the journal to `path` as pretty JSON, creating parent
    /// directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(path.to_path_buf())
    }

    /// Write the journal to a fresh file under
    /// `{tmp}/<app_label>-journals/journal-<pid>-<suffix>.json`.
    pub fn save(&self, app_label: &str) -> Result<PathBuf> {
        let directory = std::env::temp_dir().join(format!("{}-journals", app_label));
        std::fs::create_dir_all(&directory)?;

        let file = tempfile::Builder::new()
            .prefix(&format!("journal-{}-", std::process::id()))
            .suffix(".json")
            .tempfile_in(&directory)?;
        let (_, path) = file
            .keep()
            .map_err(|err| Error::Component(format!("unable to keep journal file: {}", err)))?;

        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: ExecutionStatus) -> JournalEntry {
        JournalEntry {
            index: 0,
            id: "ts".to_string(),
            kind: ComponentKind::Source,
            process_id: Some(123),
            status,
            exit_code: Some(0),
            duration_seconds: Some(0.01),
        }
    }

    #[test]
    fn test_journal_serialization_shape() {
        let mut journal = Journal::new();
        journal
            .stage_mut(ComponentKind::Source)
            .push(entry(ExecutionStatus::Succeeded));

        let rendered = serde_json::to_value(&journal).unwrap();
        assert_eq!(rendered["sources"][0]["status"], "succeeded");
        assert_eq!(rendered["sources"][0]["id"], "ts");
        assert_eq!(rendered["aggregators"], serde_json::json!([]));
        assert_eq!(rendered["sinks"], serde_json::json!([]));
    }

    #[test]
    fn test_save_creates_journal_file() {
        let mut journal = Journal::new();
        journal
            .stage_mut(ComponentKind::Sink)
            .push(entry(ExecutionStatus::TimedOut));

        let path = journal.save("tributary-journal-test").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Journal = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.sinks.len(), 1);
        assert_eq!(parsed.sinks[0].status, ExecutionStatus::TimedOut);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_save_to_explicit_path() {
        let directory = tempfile::tempdir().unwrap();
        let target = directory.path().join("nested").join("journal.json");

        let journal = Journal::new();
        journal.save_to(&target).unwrap();
        assert!(target.is_file());
    }
}
