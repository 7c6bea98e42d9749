//! Format-specific text extraction.
//!
//! Each extractor returns a sequence of extraction units whose shape carries
//! the location the chunker needs. Any failure here downgrades the file to
//! metadata-only; the orchestrator handles that, extractors just report it.

mod docx;
mod markdown;
mod pdf;
mod pptx;
mod xlsx;

use crate::error::{FinderError, Result};
use crate::model::DocKind;
use std::io::Read;
use std::path::Path;

/// One structural piece of a file, pre-chunking.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractUnit {
    /// Word paragraph or Markdown section under a running heading stack.
    Paragraph {
        header_path: Vec<String>,
        text: String,
    },
    Slide {
        slide_number: u32,
        slide_title: String,
        /// Title prepended, then every text box.
        body: String,
    },
    Sheet {
        sheet_name: String,
        /// Markdown table header and separator lines.
        header_lines: Vec<String>,
        /// One rendered table line per data row (first 50 rows).
        rows: Vec<String>,
        total_rows: usize,
    },
    Page { page_number: u32, text: String },
    /// Whole message body; supplied by mail connectors, not read from disk.
    EmailBody { text: String },
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub units: Vec<ExtractUnit>,
    pub author: Option<String>,
}

pub fn extract(path: &Path, kind: DocKind) -> Result<Extraction> {
    match kind {
        DocKind::Word => docx::extract(path),
        DocKind::Presentation => pptx::extract(path),
        DocKind::Spreadsheet => xlsx::extract(path),
        DocKind::Pdf => pdf::extract(path),
        DocKind::Markdown => markdown::extract(path),
        DocKind::Email => Err(FinderError::extraction(
            path,
            "email bodies are supplied by connectors",
        )),
    }
}

/// Read a named entry of an OOXML container to a string.
fn read_zip_entry(path: &Path, name: &str) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|e| FinderError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| FinderError::extraction(path, format!("not a valid archive: {e}")))?;
    let mut entry = archive
        .by_name(name)
        .map_err(|e| FinderError::extraction(path, format!("missing {name}: {e}")))?;
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| FinderError::extraction(path, format!("{name} is not UTF-8 XML: {e}")))?;
    Ok(content)
}

/// Like `read_zip_entry` but tolerant of a missing entry.
fn read_zip_entry_opt(path: &Path, name: &str) -> Result<Option<String>> {
    let file = std::fs::File::open(path).map_err(|e| FinderError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| FinderError::extraction(path, format!("not a valid archive: {e}")))?;
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(FinderError::extraction(path, format!("{name}: {e}"))),
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| FinderError::extraction(path, format!("{name} is not UTF-8 XML: {e}")))?;
    Ok(Some(content))
}

/// Entry names of an OOXML container, for slide/worksheet discovery.
fn zip_entry_names(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path).map_err(|e| FinderError::io(path, e))?;
    let archive = zip::ZipArchive::new(file)
        .map_err(|e| FinderError::extraction(path, format!("not a valid archive: {e}")))?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Pull `dc:creator` out of `docProps/core.xml`, shared by the OOXML formats.
fn read_core_author(path: &Path) -> Option<String> {
    let xml = read_zip_entry_opt(path, "docProps/core.xml").ok().flatten()?;
    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut in_creator = false;
    let mut author = String::new();
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(e)) if e.name().as_ref() == b"dc:creator" => {
                in_creator = true;
            }
            Ok(quick_xml::events::Event::End(e)) if e.name().as_ref() == b"dc:creator" => break,
            Ok(quick_xml::events::Event::Text(t)) if in_creator => {
                author.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    let author = author.trim().to_string();
    (!author.is_empty()).then_some(author)
}
