//! Manifest store: the single authoritative source of incremental state.

use crate::error::{FinderError, Result};
use crate::model::{Fingerprint, SCHEMA_VERSION};
use crate::util::atomic_write_json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_id: Uuid,
    pub fingerprint: Fingerprint,
    pub last_indexed_at: f64,
}

/// Map from absolute path to the last fully committed pipeline state of that
/// file. An entry is written only after both store writes for the file have
/// succeeded, so a crash mid-file is healed by the next diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: String,
    pub entries: BTreeMap<PathBuf, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            schema_version: SCHEMA_VERSION.to_string(),
            entries: BTreeMap::new(),
        }
    }
}

/// Outcome of comparing a scan against the manifest.
#[derive(Debug, Default, Clone)]
pub struct ManifestDiff {
    pub added: Vec<PathBuf>,
    pub changed: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

impl Manifest {
    /// A corrupt or unreadable manifest is treated as empty, forcing a full
    /// reindex rather than failing the run.
    pub fn load(path: &Path) -> Manifest {
        let Ok(bytes) = fs::read(path) else {
            return Manifest::default();
        };
        match serde_json::from_slice::<Manifest>(&bytes) {
            Ok(manifest) if manifest.schema_version == SCHEMA_VERSION => manifest,
            Ok(manifest) => {
                tracing::warn!(
                    "manifest {} has schema {}; starting empty",
                    path.display(),
                    manifest.schema_version
                );
                Manifest::default()
            }
            Err(e) => {
                tracing::warn!(
                    "manifest {} is corrupt ({e}); starting empty and reindexing",
                    path.display()
                );
                Manifest::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self).map_err(|e| match e {
            FinderError::StoreWrite(msg) => FinderError::StoreWrite(format!("manifest: {msg}")),
            other => other,
        })
    }

    /// Compare a scan (path → current fingerprint) against the recorded
    /// state. `changed` means any of size, mtime, or hash differs; a missing
    /// hash on either side falls back to the size/mtime comparison.
    pub fn diff(&self, scanned: &BTreeMap<PathBuf, Fingerprint>) -> ManifestDiff {
        let mut diff = ManifestDiff::default();
        for (path, fingerprint) in scanned {
            match self.entries.get(path) {
                None => diff.added.push(path.clone()),
                Some(entry) => {
                    if fingerprint_changed(&entry.fingerprint, fingerprint) {
                        diff.changed.push(path.clone());
                    }
                }
            }
        }
        for path in self.entries.keys() {
            if !scanned.contains_key(path) {
                diff.removed.push(path.clone());
            }
        }
        diff
    }
}

fn fingerprint_changed(old: &Fingerprint, new: &Fingerprint) -> bool {
    if old.size_bytes != new.size_bytes || old.modified_at != new.modified_at {
        return true;
    }
    match (&old.hash, &new.hash) {
        (Some(a), Some(b)) => a != b,
        _ => false,
    }
}
