//! Durable workspace state.
//!
//! The record lives at `<root>/<state_dir>/state.json`. Writes go through a
//! temporary sibling file that is synced and then renamed over the target, so
//! a crash leaves either the old record or the new one, never a mix.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// File name of the state record inside the state directory.
pub const STATE_FILE: &str = "state.json";

/// Suffix of in-flight temporary state files.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Persistent workspace configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Absolute workspace root.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    /// Default script for operations that omit a file name.
    #[serde(default)]
    pub primary_file: Option<String>,
    /// When the last script run finished.
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// Files produced by runs: name to mtime in seconds since the epoch.
    #[serde(default)]
    pub exports_manifest: BTreeMap<String, f64>,
    /// Keys written by other tools, kept as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StateRecord {
    /// Creates the record written when a workspace is bound.
    pub fn fresh(workspace: PathBuf, primary_file: impl Into<String>) -> Self {
        Self {
            workspace: Some(workspace),
            primary_file: Some(primary_file.into()),
            ..Default::default()
        }
    }
}

/// Loads and atomically saves a [`StateRecord`].
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    /// Serializes load-modify-save cycles within this process.
    lock: Mutex<()>,
}

impl StateStore {
    /// Creates a store for `<state_dir>/state.json`.
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(STATE_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record, returning an empty one when missing or unreadable.
    pub fn load(&self) -> StateRecord {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return StateRecord::default();
            }
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "failed to read state, using empty record");
                return StateRecord::default();
            }
        };

        match serde_json::from_str(&text) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "failed to parse state, using empty record");
                StateRecord::default()
            }
        }
    }

    /// Atomically replaces the on-disk record.
    pub fn save(&self, record: &StateRecord) -> Result<()> {
        let _guard = self.lock()?;
        self.stage(record)?.commit()
    }

    /// Loads, modifies and saves the record as one critical section.
    pub fn update(&self, modify: impl FnOnce(&mut StateRecord)) -> Result<StateRecord> {
        let _guard = self.lock()?;
        let mut record = self.load();
        modify(&mut record);
        self.stage(&record)?.commit()?;
        Ok(record)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| Error::Internal("state lock poisoned".to_string()))
    }

    /// Writes `record` to a synced temporary file next to the target.
    ///
    /// Dropping the returned value without committing removes the file.
    fn stage(&self, record: &StateRecord) -> Result<StagedRecord> {
        let mut contents = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::Internal(format!("failed to serialize state: {}", e)))?;
        contents.push(b'\n');

        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Internal("state file has no parent directory".to_string()))?;
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}.", STATE_FILE))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)?;
        file.write_all(&contents)?;
        file.as_file().sync_all()?;

        Ok(StagedRecord {
            file,
            target: self.path.clone(),
        })
    }
}

/// A fully written temporary state file awaiting its rename.
struct StagedRecord {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedRecord {
    fn commit(self) -> Result<()> {
        self.file
            .persist(&self.target)
            .map_err(|e| Error::Io(e.error))?;
        tracing::debug!(path = ?self.target, "saved state");
        Ok(())
    }
}
