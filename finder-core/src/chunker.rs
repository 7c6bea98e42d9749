//! Structural chunker: length-bounded chunks that always carry the location
//! metadata required by their format.

use crate::extract::ExtractUnit;
use crate::model::ChunkLocation;

pub const MAX_CHUNK_CHARS: usize = 1000;
pub const OVERLAP_CHARS: usize = 100;

/// A chunk before ids, tokens, and embeddings are attached. Position in the
/// returned vector becomes `chunk_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    pub text: String,
    pub location: ChunkLocation,
}

fn flush_group(path: &mut Option<Vec<String>>, text: &mut String, out: &mut Vec<ChunkPiece>) {
    if let Some(header_path) = path.take() {
        for part in split_text(text, MAX_CHUNK_CHARS, OVERLAP_CHARS) {
            out.push(ChunkPiece {
                text: part,
                location: ChunkLocation::Document {
                    header_path: header_path.clone(),
                },
            });
        }
    }
    text.clear();
}

pub fn chunk_units(units: &[ExtractUnit]) -> Vec<ChunkPiece> {
    let mut pieces = Vec::new();
    // consecutive paragraphs under the same heading scope merge before the
    // length split
    let mut group_path: Option<Vec<String>> = None;
    let mut group_text = String::new();

    for unit in units {
        match unit {
            ExtractUnit::Paragraph { header_path, text } => {
                if group_path.as_ref() != Some(header_path) {
                    flush_group(&mut group_path, &mut group_text, &mut pieces);
                    group_path = Some(header_path.clone());
                }
                if !group_text.is_empty() {
                    group_text.push('\n');
                }
                group_text.push_str(text);
            }
            other => {
                flush_group(&mut group_path, &mut group_text, &mut pieces);
                match other {
                    ExtractUnit::Slide {
                        slide_number,
                        slide_title,
                        body,
                    } => {
                        for part in split_text(body, MAX_CHUNK_CHARS, OVERLAP_CHARS) {
                            pieces.push(ChunkPiece {
                                text: part,
                                location: ChunkLocation::Slide {
                                    slide_number: *slide_number,
                                    slide_title: slide_title.clone(),
                                },
                            });
                        }
                    }
                    ExtractUnit::Sheet {
                        sheet_name,
                        header_lines,
                        rows,
                        total_rows,
                    } => {
                        chunk_sheet(sheet_name, header_lines, rows, *total_rows, &mut pieces);
                    }
                    ExtractUnit::Page { page_number, text } => {
                        for part in split_text(text, MAX_CHUNK_CHARS, OVERLAP_CHARS) {
                            pieces.push(ChunkPiece {
                                text: part,
                                location: ChunkLocation::Page {
                                    page_number: *page_number,
                                },
                            });
                        }
                    }
                    ExtractUnit::EmailBody { text } => chunk_email(text, &mut pieces),
                    ExtractUnit::Paragraph { .. } => unreachable!(),
                }
            }
        }
    }
    flush_group(&mut group_path, &mut group_text, &mut pieces);

    pieces
}

/// One sheet becomes one chunk when it fits, otherwise the table header is
/// repeated and rows are split by range. The range covers sheet rows (header
/// is row 1), so every chunk's `row_range` matches `\d+-\d+`.
fn chunk_sheet(
    sheet_name: &str,
    header_lines: &[String],
    rows: &[String],
    total_rows: usize,
    out: &mut Vec<ChunkPiece>,
) {
    let header = header_lines.join("\n");
    let truncated = total_rows > rows.len() + 1;
    let footer = truncated.then(|| format!("(Table truncated: total rows = {total_rows})"));

    if rows.is_empty() {
        let mut text = header;
        if let Some(footer) = &footer {
            text.push('\n');
            text.push_str(footer);
        }
        out.push(ChunkPiece {
            text,
            location: ChunkLocation::Sheet {
                sheet_name: sheet_name.to_string(),
                row_range: "1-1".to_string(),
            },
        });
        return;
    }

    // greedy row packing under the length budget, header repeated per chunk
    let budget = MAX_CHUNK_CHARS.saturating_sub(header.len() + 1).max(1);
    let mut batches: Vec<(usize, usize)> = Vec::new(); // (start_idx, end_idx) inclusive
    let mut start = 0usize;
    let mut len = 0usize;
    for (i, row) in rows.iter().enumerate() {
        let row_len = row.len() + 1;
        if i > start && len + row_len > budget {
            batches.push((start, i - 1));
            start = i;
            len = 0;
        }
        len += row_len;
    }
    batches.push((start, rows.len() - 1));

    let last_batch = batches.len() - 1;
    for (batch_idx, (first, last)) in batches.into_iter().enumerate() {
        let mut text = header.clone();
        for row in &rows[first..=last] {
            text.push('\n');
            text.push_str(row);
        }
        if batch_idx == last_batch {
            if let Some(footer) = &footer {
                text.push('\n');
                text.push_str(footer);
            }
        }
        // data row i sits at sheet row i + 2 (row 1 is the header)
        let range_start = if batch_idx == 0 { 1 } else { first + 2 };
        out.push(ChunkPiece {
            text,
            location: ChunkLocation::Sheet {
                sheet_name: sheet_name.to_string(),
                row_range: format!("{}-{}", range_start, last + 2),
            },
        });
    }
}

/// Whole body as one chunk; oversized bodies split on paragraph boundaries.
fn chunk_email(text: &str, out: &mut Vec<ChunkPiece>) {
    if text.chars().count() <= MAX_CHUNK_CHARS {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            out.push(ChunkPiece {
                text: trimmed.to_string(),
                location: ChunkLocation::Email,
            });
        }
        return;
    }

    let mut current = String::new();
    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        if !current.is_empty()
            && current.chars().count() + para.chars().count() + 2 > MAX_CHUNK_CHARS
        {
            out.push(ChunkPiece {
                text: std::mem::take(&mut current),
                location: ChunkLocation::Email,
            });
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }
    for part in split_text(&current, MAX_CHUNK_CHARS, OVERLAP_CHARS) {
        out.push(ChunkPiece {
            text: part,
            location: ChunkLocation::Email,
        });
    }
}

/// Length split with soft breaks at whitespace and a fixed-size overlap tail
/// carried into the next piece. Char-based, never splits a code point.
fn split_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= max_chars {
        return vec![trimmed.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let mut cut = end;
        if end < chars.len() {
            // prefer breaking at whitespace inside the window tail
            let tail_start = start + max_chars.saturating_sub(200).max(1);
            if let Some(pos) = (tail_start..end).rev().find(|&i| chars[i].is_whitespace()) {
                if pos > start {
                    cut = pos;
                }
            }
        }
        let piece: String = chars[start..cut].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        if cut >= chars.len() {
            break;
        }
        start = cut.saturating_sub(overlap).max(start + 1);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(path: &[&str], text: &str) -> ExtractUnit {
        ExtractUnit::Paragraph {
            header_path: path.iter().map(|s| s.to_string()).collect(),
            text: text.to_string(),
        }
    }

    #[test]
    fn heading_change_starts_a_new_chunk() {
        let units = vec![
            para(&["A"], "first"),
            para(&["A"], "second"),
            para(&["A", "B"], "third"),
        ];
        let pieces = chunk_units(&units);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].text, "first\nsecond");
        match &pieces[1].location {
            ChunkLocation::Document { header_path } => {
                assert_eq!(header_path, &vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn long_sections_split_with_overlap_and_repeat_header_path() {
        let body = "word ".repeat(500); // ~2500 chars
        let units = vec![para(&["Long"], &body)];
        let pieces = chunk_units(&units);
        assert!(pieces.len() >= 3);
        for piece in &pieces {
            assert!(piece.text.chars().count() <= MAX_CHUNK_CHARS);
            assert!(matches!(&piece.location, ChunkLocation::Document { header_path } if header_path == &vec!["Long".to_string()]));
        }
        // overlap: the tail of one piece reappears at the head of the next
        let tail: String = pieces[0].text.chars().rev().take(20).collect::<String>();
        let tail: String = tail.chars().rev().collect();
        assert!(pieces[1].text.contains(tail.trim()));
    }

    #[test]
    fn one_slide_yields_at_least_one_chunk() {
        let units = vec![ExtractUnit::Slide {
            slide_number: 3,
            slide_title: "Costs".to_string(),
            body: "Costs\nreduced headcount".to_string(),
        }];
        let pieces = chunk_units(&units);
        assert_eq!(pieces.len(), 1);
        assert_eq!(
            pieces[0].location,
            ChunkLocation::Slide {
                slide_number: 3,
                slide_title: "Costs".to_string()
            }
        );
    }

    #[test]
    fn oversized_slide_splits_but_keeps_slide_location() {
        let units = vec![ExtractUnit::Slide {
            slide_number: 7,
            slide_title: "Big".to_string(),
            body: "line ".repeat(400),
        }];
        let pieces = chunk_units(&units);
        assert!(pieces.len() > 1);
        for piece in pieces {
            assert!(matches!(
                piece.location,
                ChunkLocation::Slide { slide_number: 7, .. }
            ));
        }
    }

    #[test]
    fn small_sheet_is_one_chunk_with_full_range() {
        let units = vec![ExtractUnit::Sheet {
            sheet_name: "Sales".to_string(),
            header_lines: vec!["| a | b |".to_string(), "| --- | --- |".to_string()],
            rows: vec!["| 1 | 2 |".to_string(), "| 3 | 4 |".to_string()],
            total_rows: 3,
        }];
        let pieces = chunk_units(&units);
        assert_eq!(pieces.len(), 1);
        assert_eq!(
            pieces[0].location,
            ChunkLocation::Sheet {
                sheet_name: "Sales".to_string(),
                row_range: "1-3".to_string()
            }
        );
        assert!(!pieces[0].text.contains("Table truncated"));
    }

    #[test]
    fn large_sheet_splits_by_row_range_and_footers_the_last_chunk() {
        let rows: Vec<String> = (0..49).map(|i| format!("| {} | {} |", i, "x".repeat(40))).collect();
        let units = vec![ExtractUnit::Sheet {
            sheet_name: "Big".to_string(),
            header_lines: vec!["| a | b |".to_string(), "| --- | --- |".to_string()],
            rows,
            total_rows: 80,
        }];
        let pieces = chunk_units(&units);
        assert!(pieces.len() > 1);
        let range_re = regex::Regex::new(r"^\d+-\d+$").unwrap();
        for piece in &pieces {
            match &piece.location {
                ChunkLocation::Sheet { row_range, .. } => assert!(range_re.is_match(row_range)),
                other => panic!("unexpected {other:?}"),
            }
            // header repeats in every chunk
            assert!(piece.text.starts_with("| a | b |"));
        }
        assert!(pieces.last().unwrap().text.contains("(Table truncated: total rows = 80)"));
        assert!(!pieces[0].text.contains("Table truncated"));
    }

    #[test]
    fn email_splits_on_paragraph_boundaries_only_when_oversized() {
        let short = vec![ExtractUnit::EmailBody {
            text: "hello\n\nworld".to_string(),
        }];
        assert_eq!(chunk_units(&short).len(), 1);

        let long_para = "sentence ".repeat(80);
        let body = format!("{long_para}\n\n{long_para}\n\n{long_para}");
        let long = vec![ExtractUnit::EmailBody { text: body }];
        let pieces = chunk_units(&long);
        assert!(pieces.len() > 1);
        for piece in pieces {
            assert_eq!(piece.location, ChunkLocation::Email);
        }
    }

    #[test]
    fn skipped_pdf_pages_keep_chunks_contiguous() {
        let units = vec![
            ExtractUnit::Page {
                page_number: 1,
                text: "first page".to_string(),
            },
            ExtractUnit::Page {
                page_number: 3,
                text: "third page".to_string(),
            },
        ];
        let pieces = chunk_units(&units);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].location, ChunkLocation::Page { page_number: 1 });
        assert_eq!(pieces[1].location, ChunkLocation::Page { page_number: 3 });
    }

    #[test]
    fn split_text_never_exceeds_the_limit() {
        let text = "가나다라 ".repeat(400);
        let parts = split_text(&text, MAX_CHUNK_CHARS, OVERLAP_CHARS);
        assert!(parts.len() > 1);
        for part in parts {
            assert!(part.chars().count() <= MAX_CHUNK_CHARS);
        }
    }
}
