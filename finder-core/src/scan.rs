//! File enumeration and content/metadata classification.

use crate::model::{DocKind, Fingerprint};
use crate::util::{epoch_secs, sha256_file};
use ignore::WalkBuilder;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub filename: String,
    /// Lowercase, without the dot; empty when absent.
    pub extension: String,
    pub size_bytes: u64,
    pub created_at: f64,
    pub modified_at: f64,
    /// `Some` means content-indexed; `None` means metadata-only. Decided
    /// once at enumeration time and never revised upward.
    pub kind: Option<DocKind>,
}

/// Office lock files and editor temp files are never enumerated.
fn is_junk_name(name: &str) -> bool {
    name.starts_with("~$") || name.ends_with(".tmp")
}

/// Walk every root recursively, skipping junk names and (by default) hidden
/// files. Output is sorted by path and de-duplicated across overlapping
/// roots.
pub fn enumerate(roots: &[PathBuf], include_hidden: bool) -> Vec<ScannedFile> {
    let mut files: Vec<ScannedFile> = Vec::new();

    for root in roots {
        let walker = WalkBuilder::new(root)
            .hidden(!include_hidden)
            // user documents, not a repository: leave VCS ignore rules alone
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .build();

        for item in walker {
            let Ok(entry) = item else { continue };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.into_path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if is_junk_name(name) {
                continue;
            }
            let name = name.to_string();
            let Ok(meta) = std::fs::metadata(&path) else {
                continue;
            };
            files.push(scanned_from_meta(path, name, &meta));
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
    files
}

fn scanned_from_meta(path: PathBuf, filename: String, meta: &Metadata) -> ScannedFile {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let modified_at = meta.modified().map(epoch_secs).unwrap_or(0.0);
    let created_at = meta.created().map(epoch_secs).unwrap_or(modified_at);
    let kind = DocKind::from_extension(&extension);
    ScannedFile {
        path,
        filename,
        extension,
        size_bytes: meta.len(),
        created_at,
        modified_at,
        kind,
    }
}

/// Build the change-detection fingerprint. The content hash is only computed
/// for files up to `hash_ceiling_bytes`; larger files rely on size + mtime.
pub fn fingerprint(file: &ScannedFile, hash_ceiling_bytes: u64) -> Fingerprint {
    let hash = if file.size_bytes <= hash_ceiling_bytes {
        match sha256_file(&file.path) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::debug!("hashing {} failed: {e}", file.path.display());
                None
            }
        }
    } else {
        None
    };
    Fingerprint {
        size_bytes: file.size_bytes,
        modified_at: file.modified_at,
        hash,
    }
}

/// Re-read a file's metadata without walking, for single-file checks.
pub fn scan_one(path: &Path) -> Option<ScannedFile> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    let name = path.file_name()?.to_str()?.to_string();
    if is_junk_name(&name) {
        return None;
    }
    Some(scanned_from_meta(path.to_path_buf(), name, &meta))
}
