//! Persistent BM25 index over two document kinds sharing one posting list:
//! chunk docs (content files) and file docs (every file, from name/path/
//! author tokens). Metadata-only files are reachable only through file docs.

use crate::error::{FinderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use uuid::Uuid;

const K1: f32 = 1.5;
const B: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalDocKind {
    Chunk,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub doc_id: Uuid,
    pub file_id: Uuid,
    pub doc_kind: LexicalDocKind,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocEntry {
    file_id: Uuid,
    kind: LexicalDocKind,
    /// Token count; the BM25 length normalization term.
    len: usize,
}

/// BTreeMaps keep iteration deterministic, so persisted and reloaded indexes
/// rank identically.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LexicalStore {
    docs: BTreeMap<Uuid, DocEntry>,
    /// term -> doc_id -> term frequency
    postings: BTreeMap<String, BTreeMap<Uuid, usize>>,
}

impl LexicalStore {
    pub fn load(path: &Path) -> Result<LexicalStore> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LexicalStore::default())
            }
            Err(e) => return Err(FinderError::StoreRead(format!("{}: {e}", path.display()))),
        };
        let (store, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| FinderError::StoreRead(format!("{}: {e}", path.display())))?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| FinderError::StoreWrite(format!("{}: {e}", path.display())))?;
        crate::util::atomic_write(path, &bytes)
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn file_ids(&self) -> HashSet<Uuid> {
        self.docs.values().map(|entry| entry.file_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Index one chunk's tokens. Empty-token chunks are excluded from the
    /// index entirely rather than scored as zero-length docs.
    pub fn index_chunk(&mut self, chunk_id: Uuid, file_id: Uuid, tokens: &[String]) {
        self.index_doc(chunk_id, file_id, LexicalDocKind::Chunk, tokens);
    }

    /// Index the file-level doc (filename/path/author tokens). The doc id is
    /// the file id itself.
    pub fn index_file(&mut self, file_id: Uuid, tokens: &[String]) {
        self.index_doc(file_id, file_id, LexicalDocKind::File, tokens);
    }

    fn index_doc(&mut self, doc_id: Uuid, file_id: Uuid, kind: LexicalDocKind, tokens: &[String]) {
        // re-indexing a doc id replaces its postings
        self.remove_doc(&doc_id);
        if tokens.is_empty() {
            return;
        }
        self.docs.insert(
            doc_id,
            DocEntry {
                file_id,
                kind,
                len: tokens.len(),
            },
        );
        for token in tokens {
            *self
                .postings
                .entry(token.clone())
                .or_default()
                .entry(doc_id)
                .or_insert(0) += 1;
        }
    }

    /// Remove both the chunk docs and the file doc of a file. Idempotent.
    pub fn remove_file(&mut self, file_id: &Uuid) -> usize {
        let doomed: Vec<Uuid> = self
            .docs
            .iter()
            .filter(|(_, entry)| &entry.file_id == file_id)
            .map(|(doc_id, _)| *doc_id)
            .collect();
        for doc_id in &doomed {
            self.remove_doc(doc_id);
        }
        doomed.len()
    }

    fn remove_doc(&mut self, doc_id: &Uuid) {
        if self.docs.remove(doc_id).is_none() {
            return;
        }
        self.postings.retain(|_, tf_map| {
            tf_map.remove(doc_id);
            !tf_map.is_empty()
        });
    }

    pub fn search(
        &self,
        query_tokens: &[String],
        top_n: usize,
        allowed_files: Option<&HashSet<Uuid>>,
    ) -> Vec<LexicalHit> {
        if query_tokens.is_empty() || self.docs.is_empty() || top_n == 0 {
            return Vec::new();
        }
        let doc_count = self.docs.len() as f32;
        let avg_len =
            self.docs.values().map(|d| d.len).sum::<usize>() as f32 / doc_count;

        let mut scores: BTreeMap<Uuid, f32> = BTreeMap::new();
        for token in query_tokens {
            let Some(tf_map) = self.postings.get(token) else {
                continue;
            };
            let df = tf_map.len() as f32;
            let idf = ((doc_count - df + 0.5) / (df + 0.5) + 1.0).ln();
            for (doc_id, &tf) in tf_map {
                let entry = &self.docs[doc_id];
                if let Some(allowed) = allowed_files {
                    if !allowed.contains(&entry.file_id) {
                        continue;
                    }
                }
                let tf = tf as f32;
                let denom = tf + K1 * (1.0 - B + B * (entry.len as f32 / avg_len));
                *scores.entry(*doc_id).or_insert(0.0) += idf * (tf * (K1 + 1.0)) / denom;
            }
        }

        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .map(|(doc_id, score)| {
                let entry = &self.docs[&doc_id];
                LexicalHit {
                    doc_id,
                    file_id: entry.file_id,
                    doc_kind: entry.kind,
                    score,
                }
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits.truncate(top_n);
        hits
    }
}
