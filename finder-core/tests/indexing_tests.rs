mod common;

use common::{build_docx, build_pptx, build_xlsx, index, write_text, HashEmbedder, TestEnv};
use localfinder_core::embed::Embedder;
use localfinder_core::{
    CancelToken, ChunkLocation, FinderError, IndexOptions, Indexer, Result as FinderResult,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn first_run_indexes_everything_second_run_writes_nothing() {
    let env = TestEnv::new();
    write_text(&env.doc_path("notes.md"), "# Plans\nship the search engine\n");
    write_text(&env.doc_path("scan.zip"), "not really a zip");

    let ctx = env.open();
    let first = index(&ctx, &env);
    assert_eq!(first.total, 2);
    assert_eq!(first.content_indexed, 1);
    assert_eq!(first.metadata_only, 1);
    assert_eq!(first.failed, 0);

    let second = index(&ctx, &env);
    assert_eq!(second.total, 2);
    assert_eq!(second.content_indexed, 0);
    assert_eq!(second.metadata_only, 0);
    assert_eq!(second.failed, 0);
}

#[test]
fn changed_file_is_reingested_without_duplicate_chunks() {
    let env = TestEnv::new();
    let path = env.doc_path("report.md");
    write_text(&path, "# One\nfirst version of the text\n");

    let ctx = env.open();
    index(&ctx, &env);

    let (file_id, old_chunk_ids) = {
        let catalog = ctx.catalog.read().unwrap();
        let record = catalog.find_by_path(&path).expect("indexed record").clone();
        let vectors = ctx.vectors.read().unwrap();
        let ids: Vec<_> = vectors
            .rows_for_file(&record.file_id)
            .iter()
            .map(|row| row.chunk_id)
            .collect();
        (record.file_id, ids)
    };
    assert!(!old_chunk_ids.is_empty());

    write_text(
        &path,
        "# One\nsecond version, now with\n\n## Two\nmore sections than before\n",
    );
    let summary = index(&ctx, &env);
    assert_eq!(summary.content_indexed, 1);

    let catalog = ctx.catalog.read().unwrap();
    let record = catalog.find_by_path(&path).expect("still present");
    // same path keeps its file id across reindex
    assert_eq!(record.file_id, file_id);

    let vectors = ctx.vectors.read().unwrap();
    let rows = vectors.rows_for_file(&file_id);
    assert_eq!(record.index_stats.chunk_count, rows.len());
    for row in &rows {
        assert!(!old_chunk_ids.contains(&row.chunk_id), "stale chunk survived");
    }
    // exactly one dense set of chunk indexes
    let mut indexes: Vec<usize> = rows.iter().map(|row| row.chunk_index).collect();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..rows.len()).collect::<Vec<_>>());
}

#[test]
fn removed_file_is_purged_from_every_store() {
    let env = TestEnv::new();
    let path = env.doc_path("gone.md");
    write_text(&path, "# Doomed\nthis file will be deleted\n");

    let ctx = env.open();
    index(&ctx, &env);
    let file_id = ctx
        .catalog
        .read()
        .unwrap()
        .find_by_path(&path)
        .expect("indexed")
        .file_id;

    std::fs::remove_file(&path).unwrap();
    index(&ctx, &env);

    assert!(ctx.catalog.read().unwrap().get(&file_id).is_none());
    assert!(ctx.vectors.read().unwrap().rows_for_file(&file_id).is_empty());
    assert!(ctx.manifest.read().unwrap().entries.get(&path).is_none());

    let response = ctx.search(
        "doomed deleted",
        localfinder_core::SearchMode::Smart,
        &Default::default(),
    );
    assert!(response.results.iter().all(|r| r.file_id != file_id));
}

#[test]
fn broken_office_file_downgrades_but_stays_discoverable() {
    let env = TestEnv::new();
    write_text(&env.doc_path("budget_summary.docx"), "this is not a zip archive");

    let ctx = env.open();
    let summary = index(&ctx, &env);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.content_indexed, 0);
    assert_eq!(summary.metadata_only, 1);
    assert_eq!(summary.failed, 1);

    let catalog = ctx.catalog.read().unwrap();
    let record = catalog
        .find_by_path(&env.doc_path("budget_summary.docx"))
        .expect("record preserved");
    assert!(!record.content_indexed);
    assert!(record.index_stats.index_error.is_some());
    drop(catalog);

    // still reachable through its filename tokens
    let response = ctx.search("budget summary", localfinder_core::SearchMode::Smart, &Default::default());
    assert_eq!(response.results.len(), 1);
    assert!(!response.results[0].content_available);
    assert!(response.results[0].evidences.is_empty());

    // the failure is recorded in the error log
    let log = std::fs::read_to_string(
        localfinder_core::AppPaths::at(env.data_dir.path()).error_log_file(),
    )
    .unwrap();
    assert!(log.contains("budget_summary.docx"));
}

#[test]
fn office_formats_carry_their_location_metadata() {
    let env = TestEnv::new();
    build_docx(
        &env.doc_path("doc.docx"),
        &[(1, "Budget"), (0, "yearly numbers"), (2, "Q4"), (0, "quarterly cuts")],
    );
    build_pptx(
        &env.doc_path("deck.pptx"),
        &[("Kickoff", &["welcome to the project"][..])],
    );
    build_xlsx(
        &env.doc_path("table.xlsx"),
        "Sales",
        &[&["region", "amount"][..], &["east", "100"][..], &["west", "90"][..]],
    );

    let ctx = env.open();
    let summary = index(&ctx, &env);
    assert_eq!(summary.content_indexed, 3);
    assert_eq!(summary.failed, 0);

    let catalog = ctx.catalog.read().unwrap();
    let vectors = ctx.vectors.read().unwrap();

    let docx = catalog.find_by_path(&env.doc_path("doc.docx")).unwrap();
    assert_eq!(docx.author.as_deref(), Some("Kim Minsoo"));
    for row in vectors.rows_for_file(&docx.file_id) {
        assert!(matches!(&row.location, ChunkLocation::Document { .. }));
    }

    let pptx = catalog.find_by_path(&env.doc_path("deck.pptx")).unwrap();
    let slide_rows = vectors.rows_for_file(&pptx.file_id);
    assert!(!slide_rows.is_empty());
    for row in &slide_rows {
        match &row.location {
            ChunkLocation::Slide {
                slide_number,
                slide_title,
            } => {
                assert_eq!(*slide_number, 1);
                assert_eq!(slide_title, "Kickoff");
            }
            other => panic!("unexpected location {other:?}"),
        }
        // the title is prepended into the body text
        assert!(row.text.contains("Kickoff"));
    }

    let xlsx = catalog.find_by_path(&env.doc_path("table.xlsx")).unwrap();
    for row in vectors.rows_for_file(&xlsx.file_id) {
        match &row.location {
            ChunkLocation::Sheet {
                sheet_name,
                row_range,
            } => {
                assert_eq!(sheet_name, "Sales");
                assert_eq!(row_range, "1-3");
            }
            other => panic!("unexpected location {other:?}"),
        }
        assert!(row.text.contains("| east | 100 |"));
    }
}

#[test]
fn every_embedding_is_unit_norm_and_every_index_dense() {
    let env = TestEnv::new();
    build_docx(
        &env.doc_path("doc.docx"),
        &[(1, "Heading"), (0, &"long body text ".repeat(200))],
    );
    write_text(&env.doc_path("notes.md"), &format!("# A\n{}\n# B\nshort\n", "text ".repeat(300)));

    let ctx = env.open();
    index(&ctx, &env);

    let catalog = ctx.catalog.read().unwrap();
    let vectors = ctx.vectors.read().unwrap();
    for record in catalog.iter() {
        let rows = vectors.rows_for_file(&record.file_id);
        assert_eq!(record.index_stats.chunk_count, rows.len());
        assert!(record.content_indexed == !rows.is_empty());
        let mut indexes: Vec<usize> = rows.iter().map(|row| row.chunk_index).collect();
        indexes.sort_unstable();
        assert_eq!(indexes, (0..rows.len()).collect::<Vec<_>>());
        for row in rows {
            let norm: f32 = row.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3, "norm {norm} for {}", row.chunk_id);
        }
    }
}

/// Embedder that flips a cancel token partway through a run, making the
/// cancellation point deterministic.
struct CancellingEmbedder {
    inner: HashEmbedder,
    cancel: CancelToken,
    after_files: std::sync::atomic::AtomicUsize,
}

impl Embedder for CancellingEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed_batch(&self, texts: &[&str]) -> FinderResult<Vec<Vec<f32>>> {
        let remaining = self
            .after_files
            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        if remaining <= 1 {
            self.cancel.cancel();
        }
        self.inner.embed_batch(texts)
    }
}

#[test]
fn cancellation_leaves_manifest_and_stores_consistent() {
    let env = TestEnv::new();
    for i in 0..8 {
        write_text(
            &env.doc_path(&format!("doc{i}.md")),
            &format!("# File {i}\nbody text number {i}\n"),
        );
    }

    let cancel = CancelToken::new();
    let embedder = CancellingEmbedder {
        inner: HashEmbedder::new(64),
        cancel: cancel.clone(),
        after_files: std::sync::atomic::AtomicUsize::new(3),
    };
    let ctx = env.open_with_embedder(Arc::new(embedder));

    let result = Indexer::new(&ctx)
        .with_cancel(cancel)
        .run(&[env.docs_dir.path().to_path_buf()], &IndexOptions::default());
    assert!(matches!(result, Err(FinderError::Cancelled)));

    // exactly the fully processed files are committed, no orphans anywhere
    let manifest = ctx.manifest.read().unwrap();
    assert_eq!(manifest.entries.len(), 3);
    let committed: std::collections::HashSet<_> =
        manifest.entries.values().map(|e| e.file_id).collect();
    let vectors = ctx.vectors.read().unwrap();
    assert!(vectors.file_ids().iter().all(|id| committed.contains(id)));

    // state also survives on disk in consistent shape
    let reopened = env.open();
    assert_eq!(reopened.manifest.read().unwrap().entries.len(), 3);
    assert!(reopened
        .vectors
        .read()
        .unwrap()
        .file_ids()
        .iter()
        .all(|id| committed.contains(id)));

    // a fresh run picks up the remaining files
    let summary = index(&reopened, &env);
    assert_eq!(summary.content_indexed, 5);
    assert_eq!(reopened.manifest.read().unwrap().entries.len(), 8);
}

#[test]
fn crash_between_store_and_manifest_flushes_heals_on_restart() {
    let env = TestEnv::new();
    let kept = env.doc_path("kept.md");
    let torn = env.doc_path("torn.md");
    write_text(&kept, "# Kept\nstable content\n");
    write_text(&torn, "# Torn\nunusual keyword zephyrine\n");

    let ctx = env.open();
    index(&ctx, &env);
    let torn_id = ctx
        .catalog
        .read()
        .unwrap()
        .find_by_path(&torn)
        .unwrap()
        .file_id;

    // simulate a crash inside checkpoint(): the store flushes reached disk,
    // the manifest flush for torn.md did not
    {
        let mut manifest = ctx.manifest.write().unwrap();
        manifest.entries.remove(&torn);
        manifest
            .save(&localfinder_core::AppPaths::at(env.data_dir.path()).manifest_file())
            .unwrap();
    }
    drop(ctx);

    let reopened = env.open();
    let summary = index(&reopened, &env);
    // the path reads as newly added and reingests under a fresh id
    assert_eq!(summary.content_indexed, 1);
    assert_eq!(summary.failed, 0);

    {
        let catalog = reopened.catalog.read().unwrap();
        let new_id = catalog.find_by_path(&torn).unwrap().file_id;
        assert_ne!(new_id, torn_id);
        // the uncommitted id was swept, not left as a duplicate
        assert!(catalog.get(&torn_id).is_none());

        let vectors = reopened.vectors.read().unwrap();
        assert!(vectors.rows_for_file(&torn_id).is_empty());
        let committed: std::collections::HashSet<_> = reopened
            .manifest
            .read()
            .unwrap()
            .entries
            .values()
            .map(|e| e.file_id)
            .collect();
        assert!(vectors.file_ids().iter().all(|id| committed.contains(id)));
        assert!(reopened
            .lexical
            .read()
            .unwrap()
            .file_ids()
            .iter()
            .all(|id| committed.contains(id)));
    }

    // exactly one copy of the file answers queries
    let response = reopened.search(
        "zephyrine",
        localfinder_core::SearchMode::Smart,
        &Default::default(),
    );
    let hits: Vec<_> = response
        .results
        .iter()
        .filter(|r| r.filename == "torn.md")
        .collect();
    assert_eq!(hits.len(), 1);
    assert_ne!(hits[0].file_id, torn_id);
}

#[test]
fn precancelled_run_indexes_nothing() {
    let env = TestEnv::new();
    write_text(&env.doc_path("a.md"), "# A\nbody\n");

    let ctx = env.open();
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = Indexer::new(&ctx)
        .with_cancel(cancel)
        .run(&[env.docs_dir.path().to_path_buf()], &IndexOptions::default());
    assert!(matches!(result, Err(FinderError::Cancelled)));
    assert!(ctx.manifest.read().unwrap().entries.is_empty());
    assert!(ctx.vectors.read().unwrap().is_empty());
}

#[test]
fn force_reindex_rebuilds_from_scratch() {
    let env = TestEnv::new();
    write_text(&env.doc_path("a.md"), "# A\nbody\n");

    let ctx = env.open();
    index(&ctx, &env);
    let first_id = ctx
        .catalog
        .read()
        .unwrap()
        .find_by_path(&env.doc_path("a.md"))
        .unwrap()
        .file_id;

    let summary = Indexer::new(&ctx)
        .run(&[env.docs_dir.path().to_path_buf()], &IndexOptions { force: true })
        .unwrap();
    assert_eq!(summary.content_indexed, 1);

    let second_id = ctx
        .catalog
        .read()
        .unwrap()
        .find_by_path(&env.doc_path("a.md"))
        .unwrap()
        .file_id;
    // force drops the manifest, so the path is treated as newly added
    assert_ne!(first_id, second_id);
    assert_eq!(ctx.vectors.read().unwrap().file_ids().len(), 1);
}
