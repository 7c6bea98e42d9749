//! Evidence selection and snippet construction.

use crate::model::{ChunkLocation, Evidence, EvidenceScores, Snippet};
use crate::rrf::FileAggregate;
use crate::store::VectorStore;
use uuid::Uuid;

pub const SNIPPET_MIN_CHARS: usize = 200;
pub const SNIPPET_MAX_CHARS: usize = 500;
const SNIPPET_TARGET_CHARS: usize = 400;

/// Pick up to `limit` chunks by descending chunk-level RRF score, preferring
/// chunks with distinct location metadata; ties break deterministically by
/// `chunk_index`.
pub fn build_evidences(
    aggregate: &FileAggregate,
    store: &VectorStore,
    query: &str,
    query_tokens: &[String],
    limit: usize,
) -> Vec<Evidence> {
    // resolve fused chunk docs to stored rows; file-level docs carry no text
    let mut candidates: Vec<(&crate::rrf::FusedDoc, &crate::model::ChunkRecord)> = aggregate
        .docs
        .iter()
        .filter(|doc| doc.is_chunk)
        .filter_map(|doc| store.get(&doc.doc_id).map(|row| (doc, row)))
        .collect();
    candidates.sort_by(|a, b| {
        b.0.rrf
            .partial_cmp(&a.0.rrf)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.chunk_index.cmp(&b.1.chunk_index))
    });

    // first pass keeps one candidate per location, second pass fills up
    let mut chosen: Vec<usize> = Vec::new();
    let mut seen_locations: Vec<String> = Vec::new();
    for (i, (_, row)) in candidates.iter().enumerate() {
        if chosen.len() >= limit {
            break;
        }
        let label = row.location.label();
        if !seen_locations.contains(&label) {
            seen_locations.push(label);
            chosen.push(i);
        }
    }
    for i in 0..candidates.len() {
        if chosen.len() >= limit {
            break;
        }
        if !chosen.contains(&i) {
            chosen.push(i);
        }
    }
    chosen.sort_unstable();

    chosen
        .into_iter()
        .map(|i| {
            let (doc, row) = candidates[i];
            Evidence {
                evidence_id: Uuid::new_v4(),
                file_id: aggregate.file_id,
                summary: summarize(&row.location, query),
                snippet: build_snippet(&row.text, query_tokens),
                scores: EvidenceScores {
                    final_score: doc.rrf,
                    dense: doc.dense_score.unwrap_or(0.0),
                    lexical: doc.lexical_score.unwrap_or(0.0),
                },
                location: row.location.clone(),
            }
        })
        .collect()
}

fn summarize(location: &ChunkLocation, query: &str) -> String {
    match location {
        ChunkLocation::Document { header_path } => match header_path.last() {
            Some(heading) => format!("Section '{heading}' most closely matches '{query}'."),
            None => format!("This section most closely matches '{query}'."),
        },
        ChunkLocation::Slide {
            slide_number,
            slide_title,
        } => {
            if slide_title.is_empty() {
                format!("Slide {slide_number} most closely matches '{query}'.")
            } else {
                format!("Slide {slide_number} ('{slide_title}') most closely matches '{query}'.")
            }
        }
        ChunkLocation::Sheet {
            sheet_name,
            row_range,
        } => format!("Sheet '{sheet_name}' (rows {row_range}) most closely matches '{query}'."),
        ChunkLocation::Page { page_number } => {
            format!("Page {page_number} most closely matches '{query}'.")
        }
        ChunkLocation::Email => format!("This message most closely matches '{query}'."),
    }
}

/// A 200-500 char window around the densest region of query-token matches,
/// with char-offset highlight spans relative to the snippet.
pub fn build_snippet(text: &str, query_tokens: &[String]) -> Snippet {
    let chars: Vec<char> = text.chars().collect();
    let lower: Vec<char> = chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();

    let occurrences = find_occurrences(&lower, query_tokens);

    if chars.len() <= SNIPPET_MAX_CHARS {
        return Snippet {
            text: text.to_string(),
            highlights: occurrences,
        };
    }

    // anchor the window on the occurrence whose surrounding window covers
    // the most matches; fall back to the head of the text
    let mut best_start = 0usize;
    let mut best_count = 0usize;
    for &(occ_start, _) in &occurrences {
        let start = occ_start.saturating_sub(SNIPPET_TARGET_CHARS / 4);
        let end = (start + SNIPPET_TARGET_CHARS).min(chars.len());
        let count = occurrences
            .iter()
            .filter(|(s, len)| *s >= start && s + len <= end)
            .count();
        if count > best_count {
            best_count = count;
            best_start = start;
        }
    }

    let mut start = best_start.min(chars.len().saturating_sub(SNIPPET_MIN_CHARS));
    let mut end = (start + SNIPPET_TARGET_CHARS).min(chars.len());

    // snap to whitespace so the window does not open or close mid-word
    while start > 0 && !chars[start - 1].is_whitespace() && end - start < SNIPPET_MAX_CHARS {
        start -= 1;
    }
    while end < chars.len() && !chars[end - 1].is_whitespace() && end - start < SNIPPET_MAX_CHARS {
        end += 1;
    }

    let snippet_text: String = chars[start..end].iter().collect();
    let highlights = occurrences
        .into_iter()
        .filter(|(s, len)| *s >= start && s + len <= end)
        .map(|(s, len)| (s - start, len))
        .collect();

    Snippet {
        text: snippet_text,
        highlights,
    }
}

/// Char-offset occurrences of each token in the lowercased text.
fn find_occurrences(lower: &[char], query_tokens: &[String]) -> Vec<(usize, usize)> {
    let mut occurrences = Vec::new();
    for token in query_tokens {
        let needle: Vec<char> = token
            .chars()
            .map(|c| c.to_lowercase().next().unwrap_or(c))
            .collect();
        if needle.is_empty() || needle.len() > lower.len() {
            continue;
        }
        for start in 0..=(lower.len() - needle.len()) {
            if lower[start..start + needle.len()] == needle[..] {
                occurrences.push((start, needle.len()));
            }
        }
    }
    occurrences.sort_unstable();
    occurrences.dedup();
    occurrences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn short_text_becomes_the_whole_snippet() {
        let snippet = build_snippet("비용 조정 및 매출 감소 보고", &tokens(&["조정"]));
        assert_eq!(snippet.text, "비용 조정 및 매출 감소 보고");
        assert_eq!(snippet.highlights, vec![(3, 2)]);
    }

    #[test]
    fn long_text_windows_around_the_densest_match_region() {
        let filler = "lorem ipsum dolor sit amet ".repeat(30); // ~810 chars
        let text = format!("{filler}budget adjustment for budget cuts {filler}");
        let snippet = build_snippet(&text, &tokens(&["budget"]));
        assert!(snippet.text.chars().count() <= SNIPPET_MAX_CHARS);
        assert!(snippet.text.contains("budget"));
        assert!(!snippet.highlights.is_empty());
        // spans index into the snippet, not the source text
        for (start, len) in &snippet.highlights {
            let span: String = snippet
                .text
                .chars()
                .skip(*start)
                .take(*len)
                .collect();
            assert_eq!(span.to_lowercase(), "budget");
        }
    }

    #[test]
    fn no_matches_still_yields_a_window() {
        let text = "word ".repeat(300);
        let snippet = build_snippet(&text, &tokens(&["missing"]));
        assert!(snippet.text.chars().count() >= SNIPPET_MIN_CHARS);
        assert!(snippet.text.chars().count() <= SNIPPET_MAX_CHARS);
        assert!(snippet.highlights.is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let snippet = build_snippet("The Budget Review", &tokens(&["budget"]));
        assert_eq!(snippet.highlights.len(), 1);
    }
}
