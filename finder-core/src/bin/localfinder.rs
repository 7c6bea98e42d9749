//! localfinder CLI - drive the indexing and search engine from a terminal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use localfinder_core::{
    AppPaths, EngineContext, FinderError, IndexEvent, IndexOptions, IndexingController,
    SearchFilters, SearchMode, Settings,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "localfinder", version, about = "Local hybrid file search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the app-data directory (default: OS app-data/LocalFinderX)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index one or more folders incrementally
    Index {
        /// Folder roots to index
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Wipe all index data first and rebuild from scratch
        #[arg(long)]
        force: bool,
    },

    /// Search the index
    Search {
        query: String,

        /// FAST, SMART, or ASSIST
        #[arg(long, default_value = "SMART")]
        mode: String,

        /// Restrict to extensions (repeatable), e.g. --ext pdf --ext docx
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Restrict to folder prefixes (repeatable)
        #[arg(long = "folder")]
        folders: Vec<PathBuf>,
    },

    /// Show index counts
    Status,

    /// Report capabilities and check the offline configuration
    Doctor,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = match &cli.data_dir {
        Some(dir) => AppPaths::at(dir.clone()),
        None => AppPaths::resolve().context("could not resolve the app-data directory")?,
    };
    let settings = Settings::load(&paths.settings_file());

    match cli.command {
        Commands::Index { roots, force } => cmd_index(paths, settings, roots, force, cli.json),
        Commands::Search {
            query,
            mode,
            extensions,
            folders,
        } => cmd_search(paths, settings, query, &mode, extensions, folders, cli.json),
        Commands::Status => cmd_status(paths, settings, cli.json),
        Commands::Doctor => cmd_doctor(paths, settings),
    }
}

fn open_engine(paths: AppPaths, settings: Settings, force: bool) -> Result<EngineContext> {
    match EngineContext::open(paths.clone(), settings.clone()) {
        Ok(ctx) => Ok(ctx),
        Err(FinderError::SchemaMismatch { found, expected }) if force => {
            eprintln!("index data has schema {found}, expected {expected}; rebuilding");
            paths.reset_data()?;
            Ok(EngineContext::open(paths, settings)?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Attach the embedding model when the build carries one; without it the
/// engine indexes metadata-only and searches lexically.
fn attach_embedder(ctx: EngineContext) -> EngineContext {
    #[cfg(feature = "semantic")]
    {
        let mut ctx = ctx;
        match localfinder_core::embed::BertEmbedder::load(&ctx.settings) {
            Ok(embedder) => {
                ctx.settings.embedding_device = embedder.device_name().to_string();
                ctx.with_embedder(Arc::new(embedder))
            }
            Err(e) => {
                eprintln!("embedding model unavailable: {e}");
                eprintln!("content files will be indexed as metadata-only");
                ctx
            }
        }
    }
    #[cfg(not(feature = "semantic"))]
    {
        ctx
    }
}

fn cmd_index(
    paths: AppPaths,
    settings: Settings,
    roots: Vec<PathBuf>,
    force: bool,
    json: bool,
) -> Result<()> {
    let ctx = attach_embedder(open_engine(paths, settings, force)?);
    ctx.settings.save(&ctx.paths.settings_file())?;

    let handle = IndexingController::start(Arc::new(ctx), roots, IndexOptions { force });
    let mut summary = None;
    for event in handle.events.iter() {
        match event {
            IndexEvent::Progress {
                files_total,
                done,
                failed,
                current_path,
            } => {
                if !json {
                    eprintln!("[{done}/{files_total}] ({failed} failed) {}", current_path.display());
                }
            }
            IndexEvent::FileFailed { path, error } => {
                if !json {
                    eprintln!("failed: {} ({error})", path.display());
                }
            }
            IndexEvent::Summary(s) => summary = Some(s),
        }
    }

    match handle.wait() {
        Ok(s) => summary = Some(s),
        Err(FinderError::Cancelled) => eprintln!("indexing cancelled"),
        Err(e) => return Err(e.into()),
    }

    if let Some(summary) = summary {
        if json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!(
                "indexed {} files: {} content, {} metadata-only, {} failed",
                summary.total, summary.content_indexed, summary.metadata_only, summary.failed
            );
        }
    }
    Ok(())
}

fn cmd_search(
    paths: AppPaths,
    settings: Settings,
    query: String,
    mode: &str,
    extensions: Vec<String>,
    folders: Vec<PathBuf>,
    json: bool,
) -> Result<()> {
    let mode = match mode.to_uppercase().as_str() {
        "FAST" => SearchMode::Fast,
        "SMART" => SearchMode::Smart,
        "ASSIST" => SearchMode::Assist,
        other => anyhow::bail!("unknown mode '{other}' (expected FAST, SMART, or ASSIST)"),
    };
    let filters = SearchFilters {
        extensions: (!extensions.is_empty())
            .then(|| extensions.iter().map(|e| e.to_lowercase()).collect()),
        modified_after: None,
        modified_before: None,
        folders,
    };

    let ctx = attach_embedder(open_engine(paths, settings, false)?);
    let response = ctx.search(&query, mode, &filters);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if let Some(error) = &response.error {
        println!("{error}");
        return Ok(());
    }
    if response.results.is_empty() {
        println!("No matching files ({} ms)", response.elapsed_ms);
        return Ok(());
    }
    println!("{} results ({} ms)", response.results.len(), response.elapsed_ms);
    for (rank, result) in response.results.iter().enumerate() {
        println!(
            "{:2}. [{:.4}] {} ({:?}{})",
            rank + 1,
            result.final_file_score,
            result.path.display(),
            result.match_type,
            if result.content_available { "" } else { ", metadata-only" },
        );
        for evidence in &result.evidences {
            println!("      {}", evidence.summary);
            let one_line = evidence.snippet.text.replace('\n', " ");
            println!("      {}", one_line);
        }
    }
    Ok(())
}

fn cmd_status(paths: AppPaths, settings: Settings, json: bool) -> Result<()> {
    let ctx = open_engine(paths, settings, false)?;
    let files = ctx.catalog.read().map(|c| c.len()).unwrap_or(0);
    let chunks = ctx.vectors.read().map(|v| v.len()).unwrap_or(0);
    let lexical_docs = ctx.lexical.read().map(|l| l.doc_count()).unwrap_or(0);
    let manifest_entries = ctx.manifest.read().map(|m| m.entries.len()).unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "files": files,
                "chunks": chunks,
                "lexical_docs": lexical_docs,
                "manifest_entries": manifest_entries,
            })
        );
    } else {
        println!("files: {files}");
        println!("chunks: {chunks}");
        println!("lexical docs: {lexical_docs}");
        println!("manifest entries: {manifest_entries}");
    }
    Ok(())
}

fn cmd_doctor(paths: AppPaths, settings: Settings) -> Result<()> {
    println!("data dir: {}", paths.root().display());
    println!("offline mode: {}", settings.offline);
    println!("embedding model: {}", settings.embedding_model);

    let ctx = attach_embedder(open_engine(paths, settings, false)?);
    println!("embedder: {}", if ctx.embedder.is_some() { "available" } else { "unavailable" });
    println!("embedding device: {}", ctx.settings.embedding_device);
    println!(
        "korean morphological analyzer: {}",
        if ctx.settings.korean_morph_available { "available" } else { "fallback (whitespace)" }
    );
    if ctx.settings.offline {
        println!("network: model loading is restricted to the local cache");
    } else {
        println!("network: model downloads are permitted (set offline=true to refuse egress)");
    }
    Ok(())
}
