//! Point-in-time directory listings used to detect what a run produced.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// Immutable mapping of file name to modification time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, SystemTime>,
}

impl Snapshot {
    /// Captures regular files directly inside `dir`.
    ///
    /// Keys are `prefix` followed by the file name. Names for which `exclude`
    /// returns true are skipped. Symlinks are not followed and subdirectories
    /// are not descended into.
    pub fn capture(dir: &Path, prefix: &str, exclude: impl Fn(&str) -> bool) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(Self { entries });
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                // Removed between readdir and stat.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::debug!(name = ?entry.file_name(), "skipping non-UTF-8 file name");
                continue;
            };
            if exclude(&name) {
                continue;
            }
            entries.insert(format!("{}{}", prefix, name), metadata.modified()?);
        }

        Ok(Self { entries })
    }

    /// Builds a snapshot from explicit entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, SystemTime)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Merges another snapshot into this one.
    pub fn extend(&mut self, other: Snapshot) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, name: &str) -> Option<SystemTime> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SystemTime)> {
        self.entries.iter().map(|(name, mtime)| (name.as_str(), *mtime))
    }

    /// Names that are new in `self` or strictly newer than in `before`.
    ///
    /// Files present in `before` but gone from `self` are not reported.
    pub fn changed_since(&self, before: &Snapshot) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(name, mtime)| match before.entries.get(*name) {
                None => true,
                Some(previous) => *mtime > previous,
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Seconds since the Unix epoch, as stored in the export manifest.
pub fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}
