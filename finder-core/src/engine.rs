//! The search engine: query processing, both retrievers, fusion, file
//! aggregation, evidence building.

use crate::evidence::build_evidences;
use crate::model::{
    FileResult, SearchFilters, SearchMode, SearchResponse,
};
use crate::query::{self, ProcessedQuery};
use crate::rerank::RuleBasedReranker;
use crate::rrf;
use crate::store::{LexicalHit, VectorHit};
use crate::EngineContext;
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

pub const MAX_RESULTS: usize = 50;

pub struct SearchEngine<'a> {
    ctx: &'a EngineContext,
}

impl<'a> SearchEngine<'a> {
    pub fn new(ctx: &'a EngineContext) -> SearchEngine<'a> {
        SearchEngine { ctx }
    }

    /// Always returns a response; retriever failures degrade to the other
    /// source, and a bad query comes back as an empty response with an error
    /// message.
    pub fn search(&self, raw_query: &str, mode: SearchMode, filters: &SearchFilters) -> SearchResponse {
        let started = Instant::now();

        let processed = match query::process(
            raw_query,
            &self.ctx.tokenizer,
            self.ctx.embedder.as_deref(),
        ) {
            Ok(processed) => processed,
            Err(e) => {
                return SearchResponse {
                    query: raw_query.trim().to_string(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    results: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };

        let allowed = self.resolve_filters(filters);
        let knobs = mode.knobs();

        let (dense_hits, lexical_hits) = rayon::join(
            || self.dense_search(&processed, knobs.dense_top_n, allowed.as_ref()),
            || self.lexical_search(&processed.tokens, knobs.bm25_top_n, allowed.as_ref()),
        );

        let fused = rrf::fuse(&dense_hits, &lexical_hits);
        let mut results = self.assemble_results(fused, &processed, knobs.evidences_per_file);

        if knobs.rerank {
            RuleBasedReranker::default().rerank(&mut results, &processed.text);
        }
        results.truncate(MAX_RESULTS);

        SearchResponse {
            query: processed.text,
            elapsed_ms: started.elapsed().as_millis() as u64,
            results,
            error: None,
        }
    }

    /// Filters resolve to an allowed file-id set applied to both retrievers
    /// uniformly.
    fn resolve_filters(&self, filters: &SearchFilters) -> Option<HashSet<Uuid>> {
        if filters.is_empty() {
            return None;
        }
        match self.ctx.catalog.read() {
            Ok(catalog) => Some(
                catalog
                    .iter()
                    .filter(|record| filters.accepts(record))
                    .map(|record| record.file_id)
                    .collect(),
            ),
            Err(_) => {
                tracing::warn!("catalog unavailable; filters match nothing");
                Some(HashSet::new())
            }
        }
    }

    fn dense_search(
        &self,
        processed: &ProcessedQuery,
        top_n: usize,
        allowed: Option<&HashSet<Uuid>>,
    ) -> Vec<VectorHit> {
        let Some(embedding) = &processed.embedding else {
            return Vec::new();
        };
        match self.ctx.vectors.read() {
            Ok(store) => store.search(embedding, top_n, true, allowed),
            Err(_) => {
                tracing::warn!("vector store unavailable; dense retrieval degraded to empty");
                Vec::new()
            }
        }
    }

    fn lexical_search(
        &self,
        tokens: &[String],
        top_n: usize,
        allowed: Option<&HashSet<Uuid>>,
    ) -> Vec<LexicalHit> {
        match self.ctx.lexical.read() {
            Ok(store) => store.search(tokens, top_n, allowed),
            Err(_) => {
                tracing::warn!("lexical store unavailable; BM25 retrieval degraded to empty");
                Vec::new()
            }
        }
    }

    fn assemble_results(
        &self,
        fused: Vec<rrf::FusedDoc>,
        processed: &ProcessedQuery,
        evidences_per_file: usize,
    ) -> Vec<FileResult> {
        let Ok(catalog) = self.ctx.catalog.read() else {
            tracing::warn!("catalog unavailable; returning no results");
            return Vec::new();
        };
        let vectors = self.ctx.vectors.read().ok();

        let aggregates = rrf::aggregate(fused, |file_id| {
            catalog
                .get(file_id)
                .map(|record| record.content_indexed)
                .unwrap_or(false)
        });

        aggregates
            .into_iter()
            .filter_map(|aggregate| {
                // rows can outlive their catalog record briefly during a
                // reindex; such hits are dropped rather than half-rendered
                let record = catalog.get(&aggregate.file_id)?;
                let evidences = if record.content_indexed {
                    match &vectors {
                        Some(store) => build_evidences(
                            &aggregate,
                            store,
                            &processed.text,
                            &processed.tokens,
                            evidences_per_file,
                        ),
                        None => Vec::new(),
                    }
                } else {
                    Vec::new()
                };
                Some(FileResult {
                    file_id: record.file_id,
                    path: record.path.clone(),
                    filename: record.filename.clone(),
                    extension: record.extension.clone(),
                    content_available: record.content_indexed,
                    match_type: aggregate.match_type,
                    final_file_score: aggregate.final_score,
                    evidences,
                })
            })
            .take(MAX_RESULTS)
            .collect()
    }
}
