//! Reciprocal Rank Fusion and file-level aggregation.
//!
//! Both retrievers return ranked doc lists (chunk docs from either source,
//! file docs from BM25 only). Each doc's RRF score sums 1/(k + rank) over
//! the sources that ranked it; files then aggregate their docs' scores and
//! metadata-only files decay after aggregation, never before fusion.

use crate::model::MatchType;
use crate::store::{LexicalHit, VectorHit};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Standard RRF constant; frozen by the scoring contract.
pub const RRF_K: f32 = 60.0;
/// Weight of the mean-of-top-3 term in file aggregation.
pub const AGGREGATION_ALPHA: f32 = 0.2;
/// Post-aggregation decay for metadata-only files.
pub const METADATA_DECAY: f32 = 0.4;

/// One fused document (a chunk, or a file-level lexical doc) with its
/// per-source evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedDoc {
    pub doc_id: Uuid,
    pub file_id: Uuid,
    pub is_chunk: bool,
    pub rrf: f32,
    pub dense_score: Option<f32>,
    pub lexical_score: Option<f32>,
}

/// Merge the two ranked lists. Ranks are 1-based; a source that did not rank
/// a doc contributes nothing. One source alone is fine.
pub fn fuse(dense: &[VectorHit], lexical: &[LexicalHit]) -> Vec<FusedDoc> {
    let mut merged: BTreeMap<Uuid, FusedDoc> = BTreeMap::new();

    for (index, hit) in dense.iter().enumerate() {
        let rank = index + 1;
        let entry = merged.entry(hit.chunk_id).or_insert(FusedDoc {
            doc_id: hit.chunk_id,
            file_id: hit.file_id,
            is_chunk: true,
            rrf: 0.0,
            dense_score: None,
            lexical_score: None,
        });
        entry.rrf += 1.0 / (RRF_K + rank as f32);
        entry.dense_score = Some(hit.score);
    }

    for (index, hit) in lexical.iter().enumerate() {
        let rank = index + 1;
        let entry = merged.entry(hit.doc_id).or_insert(FusedDoc {
            doc_id: hit.doc_id,
            file_id: hit.file_id,
            is_chunk: matches!(hit.doc_kind, crate::store::LexicalDocKind::Chunk),
            rrf: 0.0,
            dense_score: None,
            lexical_score: None,
        });
        entry.rrf += 1.0 / (RRF_K + rank as f32);
        entry.lexical_score = Some(hit.score);
    }

    let mut fused: Vec<FusedDoc> = merged.into_values().collect();
    fused.sort_by(|a, b| {
        b.rrf
            .partial_cmp(&a.rrf)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    fused
}

#[derive(Debug, Clone)]
pub struct FileAggregate {
    pub file_id: Uuid,
    /// Pre-decay aggregation result.
    pub file_score: f32,
    pub final_score: f32,
    pub match_type: MatchType,
    /// This file's fused docs, best first.
    pub docs: Vec<FusedDoc>,
}

/// `file_score = max(scores) + alpha * mean(top3(scores))`, then decay for
/// metadata-only files. `content_indexed` reports whether a file id is
/// content-indexed.
pub fn aggregate(
    fused: Vec<FusedDoc>,
    content_indexed: impl Fn(&Uuid) -> bool,
) -> Vec<FileAggregate> {
    let mut by_file: BTreeMap<Uuid, Vec<FusedDoc>> = BTreeMap::new();
    for doc in fused {
        by_file.entry(doc.file_id).or_default().push(doc);
    }

    let mut aggregates: Vec<FileAggregate> = by_file
        .into_iter()
        .map(|(file_id, mut docs)| {
            docs.sort_by(|a, b| {
                b.rrf
                    .partial_cmp(&a.rrf)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.doc_id.cmp(&b.doc_id))
            });
            let max = docs.first().map(|d| d.rrf).unwrap_or(0.0);
            let top3 = &docs[..docs.len().min(3)];
            let mean_top3 = top3.iter().map(|d| d.rrf).sum::<f32>() / top3.len() as f32;
            let file_score = max + AGGREGATION_ALPHA * mean_top3;

            let has_dense = docs.iter().any(|d| d.dense_score.is_some());
            let has_lexical = docs.iter().any(|d| d.lexical_score.is_some());
            let match_type = match (has_dense, has_lexical) {
                (true, false) => MatchType::Semantic,
                (false, true) => MatchType::Lexical,
                _ => MatchType::Hybrid,
            };

            let decay = if content_indexed(&file_id) {
                1.0
            } else {
                METADATA_DECAY
            };

            FileAggregate {
                file_id,
                file_score,
                final_score: file_score * decay,
                match_type,
                docs,
            }
        })
        .collect();

    aggregates.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file_id.cmp(&b.file_id))
    });
    aggregates
}
