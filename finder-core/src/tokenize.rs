//! Lexical tokenization.
//!
//! Korean morphological analysis is a capability: when an analyzer is
//! available the tokenizer keeps the NNG/NNP/SL/SN classes; otherwise it
//! degrades to whitespace splitting with a one-time warning. Indexing never
//! aborts over tokenization.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// POS classes kept by the morphological path: common/proper nouns, foreign
/// letters, numbers.
pub const KEPT_POS: [&str; 4] = ["NNG", "NNP", "SL", "SN"];

#[derive(Debug, Clone)]
pub struct Morpheme {
    pub surface: String,
    /// Tag set of the analyzer's dictionary (e.g. "NNG").
    pub pos: String,
}

/// Seam for the optional Korean morphological analyzer.
pub trait MorphAnalyzer: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(&self, text: &str) -> Vec<Morpheme>;
}

pub struct Tokenizer {
    analyzer: Option<Box<dyn MorphAnalyzer>>,
    warned: AtomicBool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer::new()
    }
}

impl Tokenizer {
    /// Picks up the morphological analyzer when the build carries one.
    pub fn new() -> Tokenizer {
        #[cfg(feature = "korean-lindera")]
        {
            match lindera_impl::LinderaAnalyzer::new() {
                Ok(analyzer) => return Tokenizer::with_analyzer(Box::new(analyzer)),
                Err(e) => {
                    tracing::warn!("korean analyzer unavailable ({e}); using fallback tokenizer");
                }
            }
        }
        Tokenizer {
            analyzer: None,
            warned: AtomicBool::new(false),
        }
    }

    pub fn with_analyzer(analyzer: Box<dyn MorphAnalyzer>) -> Tokenizer {
        Tokenizer {
            analyzer: Some(analyzer),
            warned: AtomicBool::new(false),
        }
    }

    pub fn has_morph(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Content tokenization. May legitimately return an empty list; callers
    /// decide what that means.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if let Some(analyzer) = &self.analyzer {
            return analyzer
                .analyze(text)
                .into_iter()
                .filter(|m| KEPT_POS.contains(&m.pos.as_str()))
                .filter_map(|m| normalize_token(&m.surface))
                .collect();
        }
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!("no morphological analyzer available; falling back to whitespace tokenization");
        }
        text.split_whitespace()
            .filter_map(|raw| normalize_token(trim_punctuation(raw)))
            .collect()
    }

    /// File-level tokens: filename, path segments, author. Separators inside
    /// names (`_`, `-`, `.`) split here even on the fallback path so that
    /// "report_final.docx" is findable by "report".
    pub fn file_tokens(&self, filename: &str, path: &Path, author: Option<&str>) -> Vec<String> {
        let mut tokens = Vec::new();
        tokens.extend(self.tokenize(&split_separators(filename)));
        for segment in path.iter() {
            if let Some(segment) = segment.to_str() {
                if segment == "/" || segment == "\\" {
                    continue;
                }
                tokens.extend(self.tokenize(&split_separators(segment)));
            }
        }
        if let Some(author) = author {
            tokens.extend(self.tokenize(author));
        }
        tokens.dedup();
        tokens
    }
}

/// Latin tokens are lowercased and must be at least two chars; Hangul, other
/// scripts, and digit runs pass through as-is.
fn normalize_token(token: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    if token.bytes().all(|b| b.is_ascii_alphanumeric()) {
        let has_alpha = token.bytes().any(|b| b.is_ascii_alphabetic());
        if has_alpha && token.len() < 2 {
            return None;
        }
        return Some(token.to_ascii_lowercase());
    }
    Some(token.to_string())
}

fn trim_punctuation(raw: &str) -> &str {
    raw.trim_matches(|c: char| !c.is_alphanumeric())
}

fn split_separators(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect()
}

#[cfg(feature = "korean-lindera")]
mod lindera_impl {
    use super::{MorphAnalyzer, Morpheme};
    use lindera::dictionary::{load_dictionary_from_kind, DictionaryKind};
    use lindera::mode::Mode;
    use lindera::segmenter::Segmenter;
    use lindera::tokenizer::Tokenizer as LinderaTokenizer;

    pub struct LinderaAnalyzer {
        inner: LinderaTokenizer,
    }

    impl LinderaAnalyzer {
        pub fn new() -> Result<LinderaAnalyzer, String> {
            let dictionary =
                load_dictionary_from_kind(DictionaryKind::KoDic).map_err(|e| e.to_string())?;
            let segmenter = Segmenter::new(Mode::Normal, dictionary, None);
            Ok(LinderaAnalyzer {
                inner: LinderaTokenizer::new(segmenter),
            })
        }
    }

    impl MorphAnalyzer for LinderaAnalyzer {
        fn name(&self) -> &str {
            "lindera-ko-dic"
        }

        fn analyze(&self, text: &str) -> Vec<Morpheme> {
            let Ok(mut tokens) = self.inner.tokenize(text) else {
                return Vec::new();
            };
            tokens
                .iter_mut()
                .map(|token| {
                    let pos = token
                        .details()
                        .first()
                        .map(|d| d.to_string())
                        .unwrap_or_default();
                    Morpheme {
                        surface: token.text.to_string(),
                        pos,
                    }
                })
                .collect()
        }
    }
}
