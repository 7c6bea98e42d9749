//! App-data directory layout and the settings record.

use crate::error::{FinderError, Result};
use crate::model::SCHEMA_VERSION;
use crate::util::atomic_write_json;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "LocalFinderX";

/// Resolved on-disk layout, rooted at the OS app-data directory:
///
/// ```text
/// LocalFinderX/
///   data/{manifest.json, catalog.json, vectors.json, bm25.bin, schema_version.json}
///   logs/indexing_errors.log
///   config/settings.json
/// ```
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// Default per-OS app-data location.
    pub fn resolve() -> Result<AppPaths> {
        let base = dirs::data_dir().ok_or_else(|| {
            FinderError::StoreWrite("could not resolve the app-data directory".to_string())
        })?;
        Ok(AppPaths::at(base.join(APP_DIR_NAME)))
    }

    /// Explicit root, used by tests and the CLI `--data-dir` override.
    pub fn at(root: impl Into<PathBuf>) -> AppPaths {
        AppPaths { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.data_dir().join("manifest.json")
    }

    pub fn catalog_file(&self) -> PathBuf {
        self.data_dir().join("catalog.json")
    }

    pub fn vectors_file(&self) -> PathBuf {
        self.data_dir().join("vectors.json")
    }

    pub fn bm25_file(&self) -> PathBuf {
        self.data_dir().join("bm25.bin")
    }

    pub fn schema_file(&self) -> PathBuf {
        self.data_dir().join("schema_version.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("config").join("settings.json")
    }

    pub fn error_log_file(&self) -> PathBuf {
        self.root.join("logs").join("indexing_errors.log")
    }

    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.data_dir(),
            self.root.join("logs"),
            self.root.join("config"),
        ] {
            fs::create_dir_all(&dir)
                .map_err(|e| FinderError::StoreWrite(format!("{}: {e}", dir.display())))?;
        }
        Ok(())
    }

    /// Gate on `schema_version.json`. A fresh data dir gets the current
    /// version written; existing data with a different version refuses to
    /// open.
    pub fn check_schema_version(&self) -> Result<()> {
        let path = self.schema_file();
        if !path.exists() {
            return atomic_write_json(&path, &SchemaStamp::current());
        }
        let bytes = fs::read(&path).map_err(|e| FinderError::io(&path, e))?;
        let stamp: SchemaStamp = serde_json::from_slice(&bytes).unwrap_or_default();
        if stamp.schema_version != SCHEMA_VERSION {
            return Err(FinderError::SchemaMismatch {
                found: stamp.schema_version,
                expected: SCHEMA_VERSION.to_string(),
            });
        }
        Ok(())
    }

    /// Wipe persisted index data, keeping settings and logs. Used when the
    /// caller opts into a full reindex after a schema mismatch.
    pub fn reset_data(&self) -> Result<()> {
        let data = self.data_dir();
        if data.exists() {
            fs::remove_dir_all(&data)
                .map_err(|e| FinderError::StoreWrite(format!("{}: {e}", data.display())))?;
        }
        fs::create_dir_all(&data)
            .map_err(|e| FinderError::StoreWrite(format!("{}: {e}", data.display())))?;
        atomic_write_json(&self.schema_file(), &SchemaStamp::current())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SchemaStamp {
    schema_version: String,
}

impl SchemaStamp {
    fn current() -> SchemaStamp {
        SchemaStamp {
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

impl Default for SchemaStamp {
    fn default() -> Self {
        SchemaStamp {
            schema_version: "unknown".to_string(),
        }
    }
}

/// User-tunable knobs plus runtime capability flags. Corrupt or missing
/// settings fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HuggingFace model id for the sentence embedder.
    pub embedding_model: String,
    pub embedding_dim: usize,
    /// Local directory with `config.json`/`tokenizer.json`/`model.safetensors`;
    /// when unset the HuggingFace cache is used.
    pub model_dir: Option<PathBuf>,
    /// Refuse network access when loading models (cache-only).
    pub offline: bool,
    /// Hidden files are excluded unless this is flipped on.
    pub include_hidden: bool,
    /// Fingerprint hashes are only computed for files up to this size.
    pub hash_ceiling_bytes: u64,
    /// Capability flags recorded at runtime.
    pub korean_morph_available: bool,
    pub embedding_device: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            embedding_model: "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
                .to_string(),
            embedding_dim: 384,
            model_dir: None,
            offline: true,
            include_hidden: false,
            hash_ceiling_bytes: 32 * 1024 * 1024,
            korean_morph_available: false,
            embedding_device: "cpu".to_string(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Settings {
        let Ok(bytes) = fs::read(path) else {
            return Settings::default();
        };
        match serde_json::from_slice(&bytes) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("settings file {} is invalid ({e}); using defaults", path.display());
                Settings::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }
}
