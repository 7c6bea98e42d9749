//! Embedded columnar store of chunk records with brute-force cosine search.
//!
//! A single reopen-safe flat file, loaded whole and searched with a dot
//! product over normalized vectors. Deletion and reinsertion by `file_id`
//! are idempotent, which is what makes reingest safe after a crash.

use crate::error::{FinderError, Result};
use crate::model::{ChunkLocation, ChunkRecord, DocKind};
use crate::util::{atomic_write_json, dot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    pub chunk_id: Uuid,
    pub file_id: Uuid,
    pub score: f32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredRows {
    rows: Vec<ChunkRecord>,
}

#[derive(Debug, Default)]
pub struct VectorStore {
    rows: Vec<ChunkRecord>,
    by_chunk: HashMap<Uuid, usize>,
    /// Fixed once the first row arrives; inserts with another dimension are
    /// rejected.
    dimension: Option<usize>,
}

impl VectorStore {
    pub fn load(path: &Path) -> Result<VectorStore> {
        let mut store = VectorStore::default();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(e) => return Err(FinderError::StoreRead(format!("{}: {e}", path.display()))),
        };
        let stored: StoredRows = serde_json::from_slice(&bytes)
            .map_err(|e| FinderError::StoreRead(format!("{}: {e}", path.display())))?;
        for row in stored.rows {
            store.dimension.get_or_insert(row.embedding.len());
            store.by_chunk.insert(row.chunk_id, store.rows.len());
            store.rows.push(row);
        }
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(
            path,
            &StoredRows {
                rows: self.rows.clone(),
            },
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, chunk_id: &Uuid) -> Option<&ChunkRecord> {
        self.by_chunk.get(chunk_id).map(|&i| &self.rows[i])
    }

    pub fn rows_for_file(&self, file_id: &Uuid) -> Vec<&ChunkRecord> {
        self.rows.iter().filter(|r| &r.file_id == file_id).collect()
    }

    /// Append the chunk set of one file. Rows whose location variant does
    /// not match the file's extraction type, or whose vector dimension
    /// disagrees with the store, are rejected wholesale — an invalid chunk
    /// is never persisted.
    pub fn insert_many(&mut self, rows: Vec<ChunkRecord>, kind: DocKind) -> Result<()> {
        for row in &rows {
            if !row_is_valid(row, kind) {
                return Err(FinderError::StoreWrite(format!(
                    "chunk {} carries location metadata unfit for a {:?} file",
                    row.chunk_id, kind
                )));
            }
            if let Some(dim) = self.dimension {
                if row.embedding.len() != dim {
                    return Err(FinderError::StoreWrite(format!(
                        "chunk {} has vector dimension {}, store expects {dim}",
                        row.chunk_id,
                        row.embedding.len()
                    )));
                }
            } else if row.embedding.is_empty() {
                return Err(FinderError::StoreWrite(format!(
                    "chunk {} has an empty vector",
                    row.chunk_id
                )));
            }
        }
        for row in rows {
            self.dimension.get_or_insert(row.embedding.len());
            self.by_chunk.insert(row.chunk_id, self.rows.len());
            self.rows.push(row);
        }
        Ok(())
    }

    /// Remove every chunk of a file. Removing an absent file is a no-op.
    pub fn delete_by_file_id(&mut self, file_id: &Uuid) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| &row.file_id != file_id);
        let removed = before - self.rows.len();
        if removed > 0 {
            self.by_chunk = self
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| (row.chunk_id, i))
                .collect();
        }
        removed
    }

    /// Cosine top-N. Vectors are stored normalized, so the dot product is
    /// the similarity.
    pub fn search(
        &self,
        query: &[f32],
        top_n: usize,
        content_indexed_only: bool,
        allowed_files: Option<&HashSet<Uuid>>,
    ) -> Vec<VectorHit> {
        if query.is_empty() || top_n == 0 {
            return Vec::new();
        }
        let mut hits: Vec<VectorHit> = self
            .rows
            .iter()
            .filter(|row| !content_indexed_only || row.content_indexed)
            .filter(|row| allowed_files.map_or(true, |set| set.contains(&row.file_id)))
            .filter(|row| row.embedding.len() == query.len())
            .map(|row| VectorHit {
                chunk_id: row.chunk_id,
                file_id: row.file_id,
                score: dot(&row.embedding, query),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_n);
        hits
    }

    pub fn file_ids(&self) -> HashSet<Uuid> {
        self.rows.iter().map(|row| row.file_id).collect()
    }
}

/// Shared validation: the orchestrator drops invalid chunks before insert,
/// the store double-checks on the way in.
pub(crate) fn row_is_valid(row: &ChunkRecord, kind: DocKind) -> bool {
    row.location.matches(kind) && location_fields_valid(&row.location)
}

fn location_fields_valid(location: &ChunkLocation) -> bool {
    match location {
        ChunkLocation::Document { .. } => true,
        ChunkLocation::Slide { slide_number, .. } => *slide_number > 0,
        ChunkLocation::Sheet {
            sheet_name,
            row_range,
        } => !sheet_name.is_empty() && row_range_valid(row_range),
        ChunkLocation::Page { page_number } => *page_number > 0,
        ChunkLocation::Email => true,
    }
}

fn row_range_valid(range: &str) -> bool {
    let mut parts = range.splitn(2, '-');
    let ok = |s: Option<&str>| {
        s.map(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
    };
    ok(parts.next()) && ok(parts.next())
}
