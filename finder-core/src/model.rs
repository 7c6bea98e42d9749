use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Version stamped into every persisted record. Data written by a different
/// version refuses to load and requires a full reindex.
pub const SCHEMA_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Local,
    Outlook,
    Onedrive,
    Sharepoint,
    Gdrive,
}

/// Extraction family of a content-indexed file. Decides which extractor runs
/// and which `ChunkLocation` variant its chunks must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Word,
    Presentation,
    Spreadsheet,
    Pdf,
    Markdown,
    Email,
}

impl DocKind {
    /// Classify by lowercase extension. `None` means metadata-only.
    pub fn from_extension(ext: &str) -> Option<DocKind> {
        match ext {
            "docx" => Some(DocKind::Word),
            "pptx" => Some(DocKind::Presentation),
            "xlsx" => Some(DocKind::Spreadsheet),
            "pdf" => Some(DocKind::Pdf),
            "md" => Some(DocKind::Markdown),
            _ => None,
        }
    }
}

/// Change-detection tuple for incremental indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size_bytes: u64,
    /// UTC epoch seconds.
    pub modified_at: f64,
    /// sha256 of the raw bytes; skipped for files over the hash ceiling.
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub chunk_count: usize,
    pub last_indexed_at: f64,
    pub index_error: Option<String>,
}

/// One record per enumerated file; the root entity of the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub schema_version: String,
    pub file_id: Uuid,
    pub source: Source,
    pub content_indexed: bool,
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub created_at: f64,
    pub modified_at: f64,
    pub author: Option<String>,
    pub fingerprint: Fingerprint,
    pub index_stats: IndexStats,
}

/// Location metadata carried by every chunk; the variant is determined by the
/// source file's extraction family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkLocation {
    /// Word and Markdown: running heading stack (possibly empty).
    Document { header_path: Vec<String> },
    Slide {
        slide_number: u32,
        slide_title: String,
    },
    Sheet {
        sheet_name: String,
        /// 1-based inclusive data-row span, rendered as "start-end".
        row_range: String,
    },
    Page { page_number: u32 },
    Email,
}

impl ChunkLocation {
    /// Whether this variant is the one required for `kind`.
    pub fn matches(&self, kind: DocKind) -> bool {
        matches!(
            (self, kind),
            (ChunkLocation::Document { .. }, DocKind::Word)
                | (ChunkLocation::Document { .. }, DocKind::Markdown)
                | (ChunkLocation::Slide { .. }, DocKind::Presentation)
                | (ChunkLocation::Sheet { .. }, DocKind::Spreadsheet)
                | (ChunkLocation::Page { .. }, DocKind::Pdf)
                | (ChunkLocation::Email, DocKind::Email)
        )
    }

    /// Compact label used to prefer location-diverse evidence.
    pub fn label(&self) -> String {
        match self {
            ChunkLocation::Document { header_path } => {
                format!("h:{}", header_path.join("/"))
            }
            ChunkLocation::Slide { slide_number, .. } => format!("slide:{slide_number}"),
            ChunkLocation::Sheet { sheet_name, .. } => format!("sheet:{sheet_name}"),
            ChunkLocation::Page { page_number } => format!("page:{page_number}"),
            ChunkLocation::Email => "email".to_string(),
        }
    }
}

/// Persisted chunk of a content-indexed file; the row type of the vector
/// store. Never mutated in place: a reindex deletes the file's chunks
/// wholesale and writes a fresh set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub schema_version: String,
    pub chunk_id: Uuid,
    pub file_id: Uuid,
    /// 0-based, dense within a file.
    pub chunk_index: usize,
    pub text: String,
    /// L2-normalized, fixed dimension for a given model.
    pub embedding: Vec<f32>,
    /// May be empty; empty-token chunks simply stay out of the BM25 index.
    pub tokens: Vec<String>,
    pub location: ChunkLocation,
    pub content_indexed: bool,
}

/// Snippet shown to the user, with char-offset highlight spans for matched
/// query tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    pub highlights: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvidenceScores {
    #[serde(rename = "final")]
    pub final_score: f32,
    pub dense: f32,
    pub lexical: f32,
}

/// Query-time explanation attached to a file result. Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_id: Uuid,
    pub file_id: Uuid,
    pub summary: String,
    pub snippet: Snippet,
    pub scores: EvidenceScores,
    pub location: ChunkLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Semantic,
    Lexical,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub file_id: Uuid,
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub content_available: bool,
    pub match_type: MatchType,
    pub final_file_score: f32,
    pub evidences: Vec<Evidence>,
}

/// Wire shape returned to the caller verbatim; at most 50 results, sorted by
/// `final_file_score` descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub elapsed_ms: u64,
    pub results: Vec<FileResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchMode {
    Fast,
    Smart,
    Assist,
}

/// Pipeline knobs selected by the mode. Functionality is identical across
/// modes.
#[derive(Debug, Clone, Copy)]
pub struct ModeKnobs {
    pub dense_top_n: usize,
    pub bm25_top_n: usize,
    pub evidences_per_file: usize,
    pub rerank: bool,
}

impl SearchMode {
    pub fn knobs(self) -> ModeKnobs {
        match self {
            SearchMode::Fast => ModeKnobs {
                dense_top_n: 20,
                bm25_top_n: 20,
                evidences_per_file: 2,
                rerank: false,
            },
            SearchMode::Smart => ModeKnobs {
                dense_top_n: 50,
                bm25_top_n: 50,
                evidences_per_file: 3,
                rerank: false,
            },
            SearchMode::Assist => ModeKnobs {
                dense_top_n: 50,
                bm25_top_n: 50,
                evidences_per_file: 5,
                rerank: true,
            },
        }
    }
}

/// Result filters, applied uniformly to both retrievers.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Lowercase extensions without the dot; `None` means all.
    pub extensions: Option<Vec<String>>,
    /// UTC epoch seconds, inclusive.
    pub modified_after: Option<f64>,
    pub modified_before: Option<f64>,
    /// Absolute folder prefixes; `empty` means all.
    pub folders: Vec<PathBuf>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.extensions.is_none()
            && self.modified_after.is_none()
            && self.modified_before.is_none()
            && self.folders.is_empty()
    }

    pub fn accepts(&self, record: &FileRecord) -> bool {
        if let Some(exts) = &self.extensions {
            if !exts.iter().any(|e| e == &record.extension) {
                return false;
            }
        }
        if let Some(after) = self.modified_after {
            if record.modified_at < after {
                return false;
            }
        }
        if let Some(before) = self.modified_before {
            if record.modified_at > before {
                return false;
            }
        }
        if !self.folders.is_empty() && !self.folders.iter().any(|f| record.path.starts_with(f)) {
            return false;
        }
        true
    }
}

/// End-of-run report from the indexing orchestrator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexSummary {
    pub total: usize,
    pub content_indexed: usize,
    pub metadata_only: usize,
    pub failed: usize,
}
