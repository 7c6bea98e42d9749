//! Query processing: bounds checking, tokenization, query embedding.

use crate::embed::Embedder;
use crate::error::{FinderError, Result};
use crate::tokenize::Tokenizer;
use crate::util::truncate_chars;

pub const MAX_QUERY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct ProcessedQuery {
    /// Trimmed, truncated to 512 chars.
    pub text: String,
    pub tokens: Vec<String>,
    /// Absent when no embedder is available or the embedding failed; the
    /// pipeline then runs lexically.
    pub embedding: Option<Vec<f32>>,
}

pub fn process(
    raw: &str,
    tokenizer: &Tokenizer,
    embedder: Option<&dyn Embedder>,
) -> Result<ProcessedQuery> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FinderError::Query("Search query is empty".to_string()));
    }
    let text = truncate_chars(trimmed, MAX_QUERY_CHARS).to_string();

    let tokens = tokenizer.tokenize(&text);
    let embedding = match embedder {
        Some(embedder) => match embedder.embed(&text) {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!("query embedding failed ({e}); continuing lexical-only");
                None
            }
        },
        None => None,
    };

    Ok(ProcessedQuery {
        text,
        tokens,
        embedding,
    })
}
