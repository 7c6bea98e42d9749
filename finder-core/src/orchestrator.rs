//! Indexing orchestrator: drives each file through
//! fingerprint → classify → extract → chunk → tokenize → embed → persist,
//! with downgrade on failure, cooperative cancellation, and manifest-last
//! commit ordering.

use crate::chunker::{self, ChunkPiece};
use crate::error::{FinderError, Result};
use crate::extract;
use crate::manifest::ManifestEntry;
use crate::model::{
    ChunkRecord, DocKind, FileRecord, Fingerprint, IndexStats, IndexSummary, Source,
    SCHEMA_VERSION,
};
use crate::scan::{self, ScannedFile};
use crate::store::vector::row_is_valid;
use crate::util::now_epoch;
use crate::EngineContext;
use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use uuid::Uuid;

/// Stores and manifest are flushed together this often; the manifest is
/// always written last so a crash can never record files the stores do not
/// have. The inverse — store rows flushed for a file id the manifest never
/// committed — is healed by the orphan sweep at the start of the next run.
const CHECKPOINT_EVERY: usize = 25;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum IndexEvent {
    Progress {
        files_total: usize,
        done: usize,
        failed: usize,
        current_path: PathBuf,
    },
    FileFailed {
        path: PathBuf,
        error: String,
    },
    Summary(IndexSummary),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Drop all persisted state first and reindex everything.
    pub force: bool,
}

pub struct Indexer<'a> {
    ctx: &'a EngineContext,
    events: Option<Sender<IndexEvent>>,
    cancel: CancelToken,
}

enum FileOutcome {
    Content,
    MetadataOnly,
    Downgraded { error: String },
}

impl<'a> Indexer<'a> {
    pub fn new(ctx: &'a EngineContext) -> Indexer<'a> {
        Indexer {
            ctx,
            events: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_events(mut self, sender: Sender<IndexEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&self, roots: &[PathBuf], options: &IndexOptions) -> Result<IndexSummary> {
        if options.force {
            self.reset_state()?;
        }
        let swept = self.sweep_orphans()?;

        let scanned = scan::enumerate(roots, self.ctx.settings.include_hidden);
        let mut summary = IndexSummary {
            total: scanned.len(),
            ..IndexSummary::default()
        };

        // fingerprinting reads and hashes files, so it parallelizes well
        let hash_ceiling = self.ctx.settings.hash_ceiling_bytes;
        let fingerprints: BTreeMap<PathBuf, Fingerprint> = scanned
            .par_iter()
            .map(|file| (file.path.clone(), scan::fingerprint(file, hash_ceiling)))
            .collect();

        let diff = self
            .read_manifest(|manifest| manifest.diff(&fingerprints))?;
        // an unchanged tree writes nothing on a second pass
        let dirty = options.force || swept > 0 || !diff.is_empty();
        tracing::debug!(
            added = diff.added.len(),
            changed = diff.changed.len(),
            removed = diff.removed.len(),
            "manifest diff"
        );

        for path in &diff.removed {
            self.purge_removed(path)?;
        }

        let to_process: HashSet<&PathBuf> =
            diff.added.iter().chain(diff.changed.iter()).collect();
        let worklist: Vec<&ScannedFile> = scanned
            .iter()
            .filter(|file| to_process.contains(&file.path))
            .collect();
        let files_total = worklist.len();

        let mut done = 0usize;
        let mut since_checkpoint = 0usize;
        for file in worklist {
            if self.cancel.is_cancelled() {
                self.checkpoint()?;
                self.emit(IndexEvent::Summary(summary));
                return Err(FinderError::Cancelled);
            }

            let fingerprint = fingerprints
                .get(&file.path)
                .cloned()
                .unwrap_or_else(|| Fingerprint {
                    size_bytes: file.size_bytes,
                    modified_at: file.modified_at,
                    hash: None,
                });
            match self.process_file(file, fingerprint) {
                Ok(FileOutcome::Content) => summary.content_indexed += 1,
                Ok(FileOutcome::MetadataOnly) => summary.metadata_only += 1,
                Ok(FileOutcome::Downgraded { error }) => {
                    summary.metadata_only += 1;
                    summary.failed += 1;
                    self.report_failure(&file.path, &error);
                }
                Err(e) if e.is_fatal() => {
                    self.checkpoint()?;
                    return Err(e);
                }
                Err(e) => {
                    summary.failed += 1;
                    self.report_failure(&file.path, &e.to_string());
                }
            }
            done += 1;
            since_checkpoint += 1;
            self.emit(IndexEvent::Progress {
                files_total,
                done,
                failed: summary.failed,
                current_path: file.path.clone(),
            });
            if since_checkpoint >= CHECKPOINT_EVERY {
                self.checkpoint()?;
                since_checkpoint = 0;
            }
        }

        if dirty {
            self.checkpoint()?;
        }
        self.emit(IndexEvent::Summary(summary));
        Ok(summary)
    }

    /// One file through the pipeline. Every failure short of a store write
    /// downgrades the file instead of propagating.
    fn process_file(&self, file: &ScannedFile, fingerprint: Fingerprint) -> Result<FileOutcome> {
        // a changed path keeps its file id; a new path gets a fresh one
        let existing_id = self.read_manifest(|m| m.entries.get(&file.path).map(|e| e.file_id))?;
        let file_id = existing_id.unwrap_or_else(Uuid::new_v4);

        // delete-before-insert makes reingest idempotent
        if existing_id.is_some() {
            self.delete_file_rows(&file_id)?;
        }

        let mut record = FileRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            file_id,
            source: Source::Local,
            content_indexed: file.kind.is_some(),
            path: file.path.clone(),
            filename: file.filename.clone(),
            extension: file.extension.clone(),
            size_bytes: file.size_bytes,
            created_at: file.created_at,
            modified_at: file.modified_at,
            author: None,
            fingerprint: fingerprint.clone(),
            index_stats: IndexStats::default(),
        };

        let outcome = match file.kind {
            Some(kind) => match self.ingest_content(file, kind, &mut record) {
                Ok(_) => FileOutcome::Content,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    // downgrade: the FileRecord survives as metadata-only
                    record.content_indexed = false;
                    record.index_stats = IndexStats {
                        chunk_count: 0,
                        last_indexed_at: now_epoch(),
                        index_error: Some(e.to_string()),
                    };
                    self.delete_file_rows(&file_id)?;
                    FileOutcome::Downgraded {
                        error: e.to_string(),
                    }
                }
            },
            None => {
                record.index_stats.last_indexed_at = now_epoch();
                FileOutcome::MetadataOnly
            }
        };

        // every file gets a file-level lexical doc, so metadata-only files
        // stay discoverable by name
        let file_tokens = self.ctx.tokenizer.file_tokens(
            &record.filename,
            &record.path,
            record.author.as_deref(),
        );
        self.write_lexical(|lexical| lexical.index_file(file_id, &file_tokens))?;

        self.write_catalog(|catalog| catalog.upsert(record.clone()))?;
        self.write_manifest(|manifest| {
            manifest.entries.insert(
                file.path.clone(),
                ManifestEntry {
                    file_id,
                    fingerprint: fingerprint.clone(),
                    last_indexed_at: now_epoch(),
                },
            );
        })?;

        Ok(outcome)
    }

    /// Content path: extract → chunk → tokenize → embed → insert chunks →
    /// index lexical chunks. Returns the persisted chunk count.
    fn ingest_content(
        &self,
        file: &ScannedFile,
        kind: DocKind,
        record: &mut FileRecord,
    ) -> Result<usize> {
        let Some(embedder) = self.ctx.embedder.as_deref() else {
            return Err(FinderError::Embedding(
                "no embedding model available".to_string(),
            ));
        };

        let extraction = extract::extract(&file.path, kind)?;
        record.author = extraction.author.clone();

        let pieces = chunker::chunk_units(&extraction.units);
        if pieces.is_empty() {
            return Err(FinderError::extraction(&file.path, "no extractable text"));
        }

        let embedded = self.embed_pieces(&file.path, pieces, embedder)?;
        if embedded.is_empty() {
            return Err(FinderError::Embedding(format!(
                "all chunks of {} failed to embed",
                file.path.display()
            )));
        }

        // chunk_index is assigned after per-chunk drops so it stays dense
        let mut rows = Vec::with_capacity(embedded.len());
        for (index, (piece, mut embedding)) in embedded.into_iter().enumerate() {
            // the embedder contract is unit-norm vectors; renormalizing is
            // idempotent and keeps the invariant even for odd backends
            crate::util::normalize(&mut embedding);
            let tokens = self.ctx.tokenizer.tokenize(&piece.text);
            let row = ChunkRecord {
                schema_version: SCHEMA_VERSION.to_string(),
                chunk_id: Uuid::new_v4(),
                file_id: record.file_id,
                chunk_index: index,
                text: piece.text,
                embedding,
                tokens,
                location: piece.location,
                content_indexed: true,
            };
            if !row_is_valid(&row, kind) {
                tracing::warn!(
                    "dropping chunk {} of {}: incomplete location metadata",
                    index,
                    file.path.display()
                );
                continue;
            }
            rows.push(row);
        }
        // re-densify indexes if validation dropped anything
        for (index, row) in rows.iter_mut().enumerate() {
            row.chunk_index = index;
        }

        let chunk_count = rows.len();
        let lexical_docs: Vec<(Uuid, Vec<String>)> = rows
            .iter()
            .map(|row| (row.chunk_id, row.tokens.clone()))
            .collect();
        self.write_vectors(|vectors| vectors.insert_many(rows, kind))??;
        self.write_lexical(|lexical| {
            for (chunk_id, tokens) in &lexical_docs {
                lexical.index_chunk(*chunk_id, record.file_id, tokens);
            }
        })?;

        record.content_indexed = true;
        record.index_stats = IndexStats {
            chunk_count,
            last_indexed_at: now_epoch(),
            index_error: None,
        };
        Ok(chunk_count)
    }

    /// Embed all pieces, dropping individual chunks that fail. A wholesale
    /// failure (e.g. the model cannot run at all) surfaces as an error and
    /// downgrades the file.
    fn embed_pieces(
        &self,
        path: &std::path::Path,
        pieces: Vec<ChunkPiece>,
        embedder: &dyn crate::embed::Embedder,
    ) -> Result<Vec<(ChunkPiece, Vec<f32>)>> {
        let texts: Vec<&str> = pieces.iter().map(|p| p.text.as_str()).collect();
        match embedder.embed_batch(&texts) {
            Ok(vectors) if vectors.len() == pieces.len() => {
                Ok(pieces.into_iter().zip(vectors).collect())
            }
            Ok(_) => Err(FinderError::Embedding(format!(
                "embedder returned a short batch for {}",
                path.display()
            ))),
            Err(batch_err) => {
                // retry per chunk so one poisoned text only loses itself
                tracing::warn!(
                    "batch embedding failed for {} ({batch_err}); retrying per chunk",
                    path.display()
                );
                let mut kept = Vec::new();
                let mut all_failed = true;
                for piece in pieces {
                    match embedder.embed(&piece.text) {
                        Ok(vector) => {
                            all_failed = false;
                            kept.push((piece, vector));
                        }
                        Err(e) => {
                            tracing::warn!("dropping chunk of {}: {e}", path.display());
                        }
                    }
                }
                if all_failed {
                    Err(batch_err)
                } else {
                    Ok(kept)
                }
            }
        }
    }

    /// The manifest is the single authoritative record of committed state.
    /// A crash inside checkpoint() can flush store rows for a file id the
    /// manifest flush never reached; those ids are unreachable through any
    /// path and would otherwise leak forever once the path reindexes under a
    /// fresh id. Deleting everything the manifest does not reference, before
    /// diffing, makes the restart reingest clean.
    fn sweep_orphans(&self) -> Result<usize> {
        let committed: HashSet<Uuid> =
            self.read_manifest(|m| m.entries.values().map(|e| e.file_id).collect())?;

        let mut orphans: HashSet<Uuid> = HashSet::new();
        orphans.extend(self.read_vectors(|v| v.file_ids())?);
        orphans.extend(self.read_lexical(|l| l.file_ids())?);
        orphans.extend(self.read_catalog(|c| {
            c.iter().map(|record| record.file_id).collect::<HashSet<_>>()
        })?);
        orphans.retain(|id| !committed.contains(id));

        for id in &orphans {
            self.delete_file_rows(id)?;
            self.write_catalog(|catalog| {
                catalog.remove(id);
            })?;
        }
        if !orphans.is_empty() {
            tracing::warn!(
                "removed {} uncommitted file id(s) left by an interrupted run",
                orphans.len()
            );
        }
        Ok(orphans.len())
    }

    fn purge_removed(&self, path: &PathBuf) -> Result<()> {
        let Some(entry) = self.read_manifest(|m| m.entries.get(path).cloned())? else {
            return Ok(());
        };
        self.delete_file_rows(&entry.file_id)?;
        self.write_catalog(|catalog| {
            catalog.remove(&entry.file_id);
        })?;
        self.write_manifest(|manifest| {
            manifest.entries.remove(path);
        })?;
        Ok(())
    }

    fn delete_file_rows(&self, file_id: &Uuid) -> Result<()> {
        self.write_vectors(|vectors| {
            vectors.delete_by_file_id(file_id);
        })?;
        self.write_lexical(|lexical| {
            lexical.remove_file(file_id);
        })?;
        Ok(())
    }

    fn reset_state(&self) -> Result<()> {
        self.write_vectors(|v| *v = Default::default())?;
        self.write_lexical(|l| *l = Default::default())?;
        self.write_catalog(|c| *c = Default::default())?;
        self.write_manifest(|m| m.entries.clear())?;
        Ok(())
    }

    /// Flush stores first, manifest last.
    fn checkpoint(&self) -> Result<()> {
        let paths = &self.ctx.paths;
        self.read_vectors(|vectors| vectors.save(&paths.vectors_file()))??;
        self.read_lexical(|lexical| lexical.save(&paths.bm25_file()))??;
        self.read_catalog(|catalog| catalog.save(&paths.catalog_file()))??;
        self.read_manifest(|manifest| manifest.save(&paths.manifest_file()))??;
        Ok(())
    }

    fn report_failure(&self, path: &PathBuf, error: &str) {
        tracing::warn!("indexing {} failed: {error}", path.display());
        self.append_error_log(path, error);
        self.emit(IndexEvent::FileFailed {
            path: path.clone(),
            error: error.to_string(),
        });
    }

    fn append_error_log(&self, path: &PathBuf, error: &str) {
        let log_path = self.ctx.paths.error_log_file();
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .and_then(|mut f| writeln!(f, "{:.0}\t{}\t{error}", now_epoch(), path.display()));
        if let Err(e) = result {
            tracing::warn!("could not append to {}: {e}", log_path.display());
        }
    }

    fn emit(&self, event: IndexEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    // Lock plumbing: a poisoned lock is a store failure, not a panic.

    fn read_manifest<T>(&self, f: impl FnOnce(&crate::manifest::Manifest) -> T) -> Result<T> {
        self.ctx
            .manifest
            .read()
            .map(|guard| f(&guard))
            .map_err(|_| FinderError::StoreRead("manifest lock poisoned".to_string()))
    }

    fn write_manifest<T>(&self, f: impl FnOnce(&mut crate::manifest::Manifest) -> T) -> Result<T> {
        self.ctx
            .manifest
            .write()
            .map(|mut guard| f(&mut guard))
            .map_err(|_| FinderError::StoreWrite("manifest lock poisoned".to_string()))
    }

    fn read_catalog<T>(&self, f: impl FnOnce(&crate::catalog::Catalog) -> T) -> Result<T> {
        self.ctx
            .catalog
            .read()
            .map(|guard| f(&guard))
            .map_err(|_| FinderError::StoreRead("catalog lock poisoned".to_string()))
    }

    fn write_catalog<T>(&self, f: impl FnOnce(&mut crate::catalog::Catalog) -> T) -> Result<T> {
        self.ctx
            .catalog
            .write()
            .map(|mut guard| f(&mut guard))
            .map_err(|_| FinderError::StoreWrite("catalog lock poisoned".to_string()))
    }

    fn read_vectors<T>(&self, f: impl FnOnce(&crate::store::VectorStore) -> T) -> Result<T> {
        self.ctx
            .vectors
            .read()
            .map(|guard| f(&guard))
            .map_err(|_| FinderError::StoreRead("vector store lock poisoned".to_string()))
    }

    fn write_vectors<T>(&self, f: impl FnOnce(&mut crate::store::VectorStore) -> T) -> Result<T> {
        self.ctx
            .vectors
            .write()
            .map(|mut guard| f(&mut guard))
            .map_err(|_| FinderError::StoreWrite("vector store lock poisoned".to_string()))
    }

    fn read_lexical<T>(&self, f: impl FnOnce(&crate::store::LexicalStore) -> T) -> Result<T> {
        self.ctx
            .lexical
            .read()
            .map(|guard| f(&guard))
            .map_err(|_| FinderError::StoreRead("lexical store lock poisoned".to_string()))
    }

    fn write_lexical<T>(&self, f: impl FnOnce(&mut crate::store::LexicalStore) -> T) -> Result<T> {
        self.ctx
            .lexical
            .write()
            .map(|mut guard| f(&mut guard))
            .map_err(|_| FinderError::StoreWrite("lexical store lock poisoned".to_string()))
    }
}

/// Worker-thread contract: the caller's thread never runs the pipeline.
pub struct IndexingController;

pub struct IndexingHandle {
    pub events: Receiver<IndexEvent>,
    cancel: CancelToken,
    join: JoinHandle<Result<IndexSummary>>,
}

impl IndexingHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Block until the worker finishes and return its summary.
    pub fn wait(self) -> Result<IndexSummary> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(FinderError::StoreWrite(
                "indexing worker panicked".to_string(),
            )),
        }
    }
}

impl IndexingController {
    pub fn start(
        ctx: Arc<EngineContext>,
        roots: Vec<PathBuf>,
        options: IndexOptions,
    ) -> IndexingHandle {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let join = std::thread::spawn(move || {
            Indexer::new(&ctx)
                .with_events(tx)
                .with_cancel(worker_cancel)
                .run(&roots, &options)
        });
        IndexingHandle {
            events: rx,
            cancel,
            join,
        }
    }
}
