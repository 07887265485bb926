//! The run ledger and its durable stores.

use crate::core::{Period, RunRecord};
use crate::errors::GateflowError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LEDGER_VERSION: u32 = 1;

/// Append-only history of finalized runs, keyed by period.
///
/// Every attempt is kept; the latest attempt for a period decides whether
/// the period is resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LedgerFile", into = "LedgerFile")]
pub struct RunHistory {
    runs: BTreeMap<Period, Vec<RunRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    records: Vec<RunRecord>,
}

impl TryFrom<LedgerFile> for RunHistory {
    type Error = String;

    fn try_from(file: LedgerFile) -> Result<Self, Self::Error> {
        if file.version > LEDGER_VERSION {
            return Err(format!(
                "ledger version {} is newer than supported version {LEDGER_VERSION}",
                file.version
            ));
        }
        let mut history = Self::default();
        for record in file.records {
            history.append(record);
        }
        Ok(history)
    }
}

impl From<RunHistory> for LedgerFile {
    fn from(history: RunHistory) -> Self {
        Self {
            version: LEDGER_VERSION,
            records: history.runs.into_values().flatten().collect(),
        }
    }
}

impl RunHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finalized record.
    pub fn append(&mut self, record: RunRecord) {
        self.runs.entry(record.period()).or_default().push(record);
    }

    /// Returns the latest attempt for a period.
    #[must_use]
    pub fn latest(&self, period: Period) -> Option<&RunRecord> {
        self.runs.get(&period).and_then(|runs| runs.last())
    }

    /// Returns every attempt for a period, oldest first.
    #[must_use]
    pub fn attempts(&self, period: Period) -> &[RunRecord] {
        self.runs.get(&period).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns true if the period's latest attempt succeeded on every node.
    #[must_use]
    pub fn is_resolved(&self, period: Period) -> bool {
        self.latest(period).is_some_and(RunRecord::is_success)
    }

    /// Returns the latest attempt of every recorded period, oldest period first.
    #[must_use]
    pub fn latest_records(&self) -> Vec<&RunRecord> {
        self.runs.values().filter_map(|runs| runs.last()).collect()
    }

    /// Returns the recorded periods in order.
    pub fn periods(&self) -> impl Iterator<Item = Period> + '_ {
        self.runs.keys().copied()
    }

    /// Returns the number of recorded periods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Returns the total number of attempts across all periods.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.runs.values().map(Vec::len).sum()
    }

    /// Removes the latest attempt for a period.
    pub(crate) fn pop(&mut self, period: Period) -> Option<RunRecord> {
        let runs = self.runs.get_mut(&period)?;
        let record = runs.pop();
        if runs.is_empty() {
            self.runs.remove(&period);
        }
        record
    }
}

/// Durable storage for the run ledger.
pub trait RunHistoryStore: Send + Sync + Debug {
    /// Loads the ledger. A store that has never been written is empty.
    ///
    /// # Errors
    ///
    /// Returns a `GateflowError` if the ledger exists but cannot be read.
    fn load(&self) -> Result<RunHistory, GateflowError>;

    /// Replaces the stored ledger.
    ///
    /// # Errors
    ///
    /// Returns a `GateflowError` if the ledger cannot be written.
    fn save(&self, history: &RunHistory) -> Result<(), GateflowError>;
}

/// In-memory ledger, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    history: RwLock<RunHistory>,
    saves: RwLock<usize>,
}

impl InMemoryHistoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `history`.
    #[must_use]
    pub fn with_history(history: RunHistory) -> Self {
        Self {
            history: RwLock::new(history),
            saves: RwLock::new(0),
        }
    }

    /// Returns how many times the ledger was saved.
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.read()
    }
}

impl RunHistoryStore for InMemoryHistoryStore {
    fn load(&self) -> Result<RunHistory, GateflowError> {
        Ok(self.history.read().clone())
    }

    fn save(&self, history: &RunHistory) -> Result<(), GateflowError> {
        *self.history.write() = history.clone();
        *self.saves.write() += 1;
        Ok(())
    }
}

/// Ledger persisted as a JSON file.
///
/// Writes go to a temporary file next to the ledger and are renamed into
/// place, so a crash leaves either the old or the new ledger.
#[derive(Debug, Clone)]
pub struct JsonFileHistoryStore {
    path: PathBuf,
}

impl JsonFileHistoryStore {
    /// Creates a store at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the ledger path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl RunHistoryStore for JsonFileHistoryStore {
    fn load(&self) -> Result<RunHistory, GateflowError> {
        if !self.path.exists() {
            debug!(path = ?self.path, "No run ledger yet, starting empty");
            return Ok(RunHistory::new());
        }

        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            GateflowError::Persistence(format!("Failed to read {}: {e}", self.path.display()))
        })?;
        let history: RunHistory = serde_json::from_str(&json).map_err(|e| {
            GateflowError::Persistence(format!("Failed to parse {}: {e}", self.path.display()))
        })?;
        info!(
            path = ?self.path,
            periods = history.len(),
            attempts = history.attempt_count(),
            "Loaded run ledger"
        );
        Ok(history)
    }

    fn save(&self, history: &RunHistory) -> Result<(), GateflowError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                GateflowError::Persistence(format!(
                    "Failed to create ledger directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(history)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json).map_err(|e| {
            GateflowError::Persistence(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            GateflowError::Persistence(format!(
                "Failed to rename {} into place: {e}",
                tmp.display()
            ))
        })?;
        debug!(path = ?self.path, periods = history.len(), "Saved run ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageResult;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn period(d: u32) -> Period {
        Period::on_day(2024, 1, d, 16).unwrap()
    }

    fn succeeded(d: u32) -> RunRecord {
        let mut record = RunRecord::start(period(d), Uuid::new_v4(), None);
        record.push(StageResult::success("a"));
        record.complete();
        record
    }

    fn failed(d: u32) -> RunRecord {
        let mut record = RunRecord::start(period(d), Uuid::new_v4(), None);
        record.push(StageResult::infrastructure_failure("a", "refused"));
        record.fail("a", "refused");
        record
    }

    #[test]
    fn test_latest_attempt_decides() {
        let mut history = RunHistory::new();
        history.append(failed(1));
        assert!(!history.is_resolved(period(1)));

        history.append(succeeded(1));
        assert!(history.is_resolved(period(1)));
        assert_eq!(history.attempts(period(1)).len(), 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.attempt_count(), 2);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileHistoryStore::new(dir.path().join("ledger.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileHistoryStore::new(dir.path().join("state").join("ledger.json"));

        let mut history = RunHistory::new();
        history.append(succeeded(1));
        history.append(failed(2));
        history.append(succeeded(2));
        store.save(&history).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, history);
        assert!(loaded.is_resolved(period(2)));
        assert!(!dir.path().join("state").join("ledger.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_ledger_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileHistoryStore::new(path).load().unwrap_err();
        assert!(matches!(err, GateflowError::Persistence(_)));
    }
}
