//! Local, offline hybrid file-search engine.
//!
//! Indexing walks user-selected folders, classifies each file as
//! content-indexed or metadata-only, extracts and chunks text, embeds and
//! tokenizes it, and persists everything under a manifest-based incremental
//! protocol. Search fuses dense and BM25 retrieval at file granularity and
//! returns explainable results with evidence snippets.

mod catalog;
mod chunker;
mod config;
mod engine;
mod error;
mod evidence;
mod manifest;
mod model;
mod orchestrator;
mod query;
mod rerank;
mod rrf;
mod scan;
mod store;
mod tokenize;
mod util;

pub mod embed;
pub mod extract;

pub use crate::catalog::Catalog;
pub use crate::chunker::{chunk_units, ChunkPiece, MAX_CHUNK_CHARS, OVERLAP_CHARS};
pub use crate::config::{AppPaths, Settings};
pub use crate::engine::{SearchEngine, MAX_RESULTS};
pub use crate::error::{FinderError, Result};
pub use crate::evidence::{build_snippet, SNIPPET_MAX_CHARS, SNIPPET_MIN_CHARS};
pub use crate::manifest::{Manifest, ManifestDiff, ManifestEntry};
pub use crate::model::*;
pub use crate::orchestrator::{
    CancelToken, IndexEvent, IndexOptions, Indexer, IndexingController, IndexingHandle,
};
pub use crate::query::{ProcessedQuery, MAX_QUERY_CHARS};
pub use crate::rerank::RuleBasedReranker;
pub use crate::rrf::{AGGREGATION_ALPHA, METADATA_DECAY, RRF_K};
pub use crate::scan::{enumerate, fingerprint, scan_one, ScannedFile};
pub use crate::store::{LexicalDocKind, LexicalHit, LexicalStore, VectorHit, VectorStore};
pub use crate::tokenize::{MorphAnalyzer, Morpheme, Tokenizer};

use crate::embed::Embedder;
use std::sync::{Arc, RwLock};

/// Process-wide engine state: paths, settings, the three stores, tokenizer,
/// and the optional embedder. Passed explicitly — writers serialize through
/// the orchestrator, search reads concurrently.
pub struct EngineContext {
    pub paths: AppPaths,
    pub settings: Settings,
    pub tokenizer: Tokenizer,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub manifest: RwLock<Manifest>,
    pub catalog: RwLock<Catalog>,
    pub vectors: RwLock<VectorStore>,
    pub lexical: RwLock<LexicalStore>,
}

impl EngineContext {
    /// Open (or create) the on-disk layout and load all persisted state.
    /// A schema-version mismatch refuses to open; a corrupt store falls back
    /// to empty state with a cleared manifest, so the next indexing run
    /// rebuilds everything.
    pub fn open(paths: AppPaths, mut settings: Settings) -> Result<EngineContext> {
        paths.ensure_layout()?;
        paths.check_schema_version()?;

        let mut manifest = Manifest::load(&paths.manifest_file());
        let catalog = Catalog::load(&paths.catalog_file());

        let mut stores_ok = true;
        let vectors = VectorStore::load(&paths.vectors_file()).unwrap_or_else(|e| {
            tracing::warn!("vector store unreadable ({e}); starting empty");
            stores_ok = false;
            VectorStore::default()
        });
        let lexical = LexicalStore::load(&paths.bm25_file()).unwrap_or_else(|e| {
            tracing::warn!("lexical store unreadable ({e}); starting empty");
            stores_ok = false;
            LexicalStore::default()
        });
        if !stores_ok {
            // force a full reingest rather than serving a half-empty index
            manifest.entries.clear();
        }

        let tokenizer = Tokenizer::new();
        settings.korean_morph_available = tokenizer.has_morph();

        Ok(EngineContext {
            paths,
            settings,
            tokenizer,
            embedder: None,
            manifest: RwLock::new(manifest),
            catalog: RwLock::new(catalog),
            vectors: RwLock::new(vectors),
            lexical: RwLock::new(lexical),
        })
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> EngineContext {
        self.embedder = Some(embedder);
        self
    }

    /// Run a query through the full pipeline on the calling thread. The
    /// worker-thread contract is the caller's: UI threads should call this
    /// from a worker.
    pub fn search(
        &self,
        query: &str,
        mode: SearchMode,
        filters: &SearchFilters,
    ) -> SearchResponse {
        SearchEngine::new(self).search(query, mode, filters)
    }
}
