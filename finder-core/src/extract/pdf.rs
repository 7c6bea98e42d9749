//! PDF extraction: one unit per page; pages with no extractable text are
//! skipped (the chunk index stays dense, page numbers keep the gap visible).

use super::{ExtractUnit, Extraction};
use crate::error::{FinderError, Result};
use std::path::Path;

pub fn extract(path: &Path) -> Result<Extraction> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|e| FinderError::extraction(path, format!("pdf parse failed: {e}")))?;

    let units = pages
        .into_iter()
        .enumerate()
        .filter_map(|(index, text)| {
            let text = normalize_page_text(&text);
            if text.is_empty() {
                return None;
            }
            Some(ExtractUnit::Page {
                page_number: (index + 1) as u32,
                text,
            })
        })
        .collect();

    Ok(Extraction {
        units,
        author: None,
    })
}

/// Collapse the extractor's layout artifacts: runs of blank lines and
/// trailing whitespace per line.
fn normalize_page_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;
    for line in raw.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(line);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_pages_normalize_to_empty() {
        assert_eq!(normalize_page_text("  \n\n \t \n"), "");
    }

    #[test]
    fn blank_runs_collapse_to_paragraph_breaks() {
        let raw = "Title   \n\n\n\nFirst line\nSecond line\n";
        assert_eq!(normalize_page_text(raw), "Title\n\nFirst line\nSecond line");
    }
}
