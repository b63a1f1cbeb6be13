//! Snapshot storage.
//!
//! Snapshots live next to each spec file as
//! `__snapshots__/<basename>.snap.json`: a JSON object keyed by
//! `<request-name>[::<snapshot-name>]` (or `anon_<hash>` for unnamed
//! requests). The store is constructed per invocation and handed to the
//! evaluator through its options; update mode overwrites mismatches and
//! records missing entries, otherwise a mismatch fails the assertion.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::error::Result;

/// Result of checking one value against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    /// Stored value matches.
    Match,
    /// Update mode recorded a new entry.
    Created,
    /// Update mode replaced a differing entry.
    Updated,
    /// No entry recorded and update mode is off.
    Missing,
    /// Stored value differs.
    Mismatch { expected: Value },
}

impl SnapshotOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Match | Self::Created | Self::Updated)
    }
}

/// Per-invocation snapshot handle for one spec file.
pub struct SnapshotStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
    update: bool,
    dirty: AtomicBool,
}

impl SnapshotStore {
    /// Opens the store for `spec_path`, loading existing entries if the
    /// snapshot file exists.
    pub fn for_spec(spec_path: &Path, update: bool) -> Result<Self> {
        let dir = spec_path.parent().unwrap_or_else(|| Path::new("."));
        let basename = spec_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshots".to_string());
        let path = dir.join("__snapshots__").join(format!("{basename}.snap.json"));

        let entries = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            update,
            dirty: AtomicBool::new(false),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Compares `actual` against the stored entry for `key`, recording
    /// it in update mode.
    pub fn check(&self, key: &str, actual: &Value) -> SnapshotOutcome {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(stored) if stored == actual => SnapshotOutcome::Match,
            Some(stored) => {
                if self.update {
                    entries.insert(key.to_string(), actual.clone());
                    self.dirty.store(true, Ordering::SeqCst);
                    SnapshotOutcome::Updated
                } else {
                    SnapshotOutcome::Mismatch {
                        expected: stored.clone(),
                    }
                }
            }
            None => {
                if self.update {
                    entries.insert(key.to_string(), actual.clone());
                    self.dirty.store(true, Ordering::SeqCst);
                    SnapshotOutcome::Created
                } else {
                    SnapshotOutcome::Missing
                }
            }
        }
    }

    /// Writes the store back to disk when update mode changed it.
    pub fn persist(&self) -> Result<()> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let entries = self.entries.lock().unwrap();
        let text = serde_json::to_string_pretty(&Value::Object(entries.clone()))?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

/// Snapshot key for a request: its name, or `anon_<hash>` derived from
/// the method and URL for unnamed requests.
pub fn request_key(name: Option<&str>, method: &str, url: &str) -> String {
    match name {
        Some(name) => name.to_string(),
        None => {
            use sha2::{Digest, Sha256};
            let digest = Sha256::digest(format!("{method} {url}"));
            format!("anon_{}", &hex::encode(digest)[..8])
        }
    }
}
