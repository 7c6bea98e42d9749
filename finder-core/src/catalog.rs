//! Persistent FileRecord catalog, keyed by `file_id`.

use crate::error::Result;
use crate::model::FileRecord;
use crate::util::atomic_write_json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Backs search filters, aggregation decay, and result assembly. Mutated only
/// by the indexing orchestrator.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    records: BTreeMap<Uuid, FileRecord>,
}

impl Catalog {
    pub fn load(path: &Path) -> Catalog {
        let Ok(bytes) = fs::read(path) else {
            return Catalog::default();
        };
        match serde_json::from_slice(&bytes) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!("catalog {} is corrupt ({e}); starting empty", path.display());
                Catalog::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }

    pub fn upsert(&mut self, record: FileRecord) {
        self.records.insert(record.file_id, record);
    }

    pub fn remove(&mut self, file_id: &Uuid) -> Option<FileRecord> {
        self.records.remove(file_id)
    }

    pub fn get(&self, file_id: &Uuid) -> Option<&FileRecord> {
        self.records.get(file_id)
    }

    pub fn find_by_path(&self, path: &PathBuf) -> Option<&FileRecord> {
        self.records.values().find(|r| &r.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
