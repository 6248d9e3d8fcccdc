//! File-based state persistence.
//!
//! Every entity lands in its own JSON file keyed by name: human-readable
//! and cheap to enumerate on startup. Writes are unconditional overwrites
//! (last write wins); there is no within-process file contention beyond
//! the registry lock.

use std::path::{Path, PathBuf};

use runnerd_core::{Error, Result};

use crate::record::{ProcessRecord, RunState};
use crate::schedule::{JobArtifact, TimingRule};

/// Durable storage for process records, timing rules, and job artifacts.
///
/// Layout:
/// - `<data_dir>/processes/<name>.json`
/// - `<schedule_dir>/rules/<name>.json`
/// - `<schedule_dir>/<process>.json` (assigned-job artifact)
pub struct StateStore {
    data_dir: PathBuf,
    schedule_dir: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: &Path, schedule_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            schedule_dir: schedule_dir.to_path_buf(),
        }
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.data_dir.join("processes").join(format!("{name}.json"))
    }

    fn rule_path(&self, name: &str) -> PathBuf {
        self.schedule_dir.join("rules").join(format!("{name}.json"))
    }

    fn artifact_path(&self, process: &str) -> PathBuf {
        self.schedule_dir.join(format!("{process}.json"))
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| Error::Config(format!("failed to serialize {}: {e}", path.display())))?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "state saved");
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| Error::CorruptState {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn save_record(&self, record: &ProcessRecord) -> Result<()> {
        Self::write_json(&self.record_path(&record.name), record)
    }

    /// Remove a record's state file. A file that is already gone is fine.
    pub fn delete_record(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.record_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate the process directory and load every record.
    ///
    /// A single corrupt entry is logged and skipped, never aborting the
    /// whole load. Runtime fields are forcibly reset: the supervisor never
    /// assumes a previously-running OS process survived its own restart.
    pub fn load_all_records(&self) -> Result<Vec<ProcessRecord>> {
        let dir = self.data_dir.join("processes");
        if !dir.exists() {
            tracing::info!(path = %dir.display(), "process data directory absent, nothing to load");
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_json::<ProcessRecord>(&path) {
                Ok(mut record) => {
                    record.state = RunState::Stopped;
                    record.child = None;
                    record.armed = None;
                    records.push(record);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }
        Ok(records)
    }

    pub fn rule_exists(&self, name: &str) -> bool {
        self.rule_path(name).exists()
    }

    pub fn save_rule(&self, rule: &TimingRule) -> Result<()> {
        Self::write_json(&self.rule_path(&rule.name), rule)
    }

    pub fn load_rule(&self, name: &str) -> Result<TimingRule> {
        match Self::read_json(&self.rule_path(name)) {
            Err(Error::NotFound(_)) => Err(Error::rule_not_found(name)),
            other => other,
        }
    }

    pub fn save_artifact(&self, artifact: &JobArtifact) -> Result<()> {
        Self::write_json(&self.artifact_path(&artifact.process), artifact)
    }

    /// Remove the assigned-job artifact for a process, if present.
    pub fn delete_artifact(&self, process: &str) -> Result<()> {
        match std::fs::remove_file(self.artifact_path(process)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LaunchMode;
    use chrono::{TimeZone, Utc};

    fn scratch(name: &str) -> StateStore {
        let base = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&base).ok();
        StateStore::new(&base.join("data"), &base.join("sched"))
    }

    #[test]
    fn test_record_roundtrip() {
        let store = scratch("runnerd-test-store-rt");
        let rec = ProcessRecord::new("svc", "/bin/true", LaunchMode::Manual);
        store.save_record(&rec).unwrap();

        let loaded = store.load_all_records().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "svc");
        assert_eq!(loaded[0].path, "/bin/true");
    }

    #[test]
    fn test_load_resets_runtime_state() {
        let store = scratch("runnerd-test-store-reset");
        let mut rec = ProcessRecord::new("svc", "/bin/true", LaunchMode::Manual);
        rec.state = RunState::Running { pid: 31337 };
        store.save_record(&rec).unwrap();

        let loaded = store.load_all_records().unwrap();
        assert_eq!(loaded[0].state, RunState::Stopped);
        assert!(loaded[0].child.is_none());
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let store = scratch("runnerd-test-store-corrupt");
        store
            .save_record(&ProcessRecord::new("good", "/bin/true", LaunchMode::Manual))
            .unwrap();
        let bad = store.record_path("bad");
        std::fs::write(&bad, "{ not json").unwrap();

        let loaded = store.load_all_records().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "good");
    }

    #[test]
    fn test_missing_rule_is_not_found() {
        let store = scratch("runnerd-test-store-norule");
        let err = store.load_rule("ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_rule_roundtrip() {
        let store = scratch("runnerd-test-store-rule");
        let rule = TimingRule {
            name: "r1".into(),
            trigger_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        store.save_rule(&rule).unwrap();
        assert!(store.rule_exists("r1"));
        assert_eq!(store.load_rule("r1").unwrap(), rule);
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let store = scratch("runnerd-test-store-del");
        store.delete_record("ghost").unwrap();
        store.delete_artifact("ghost").unwrap();
    }
}
