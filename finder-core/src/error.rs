use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, FinderError>;

/// Failure taxonomy for the engine. Per-file and per-chunk errors are caught
/// and counted inside the orchestrator loop; only fatal kinds (store write,
/// schema mismatch) abort an operation. User-facing messages stay plain.
#[derive(Debug, thiserror::Error)]
pub enum FinderError {
    #[error("could not read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not extract text from {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("could not write index data: {0}")]
    StoreWrite(String),

    #[error("could not read index data: {0}")]
    StoreRead(String),

    #[error("{0}")]
    Query(String),

    #[error("index data has schema version {found}, expected {expected}; a full reindex is required")]
    SchemaMismatch { found: String, expected: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl FinderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FinderError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn extraction(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FinderError::Extraction {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Fatal errors abort the whole indexing run instead of downgrading the
    /// current file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FinderError::StoreWrite(_) | FinderError::SchemaMismatch { .. } | FinderError::Cancelled
        )
    }
}
