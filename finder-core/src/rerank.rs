//! Rule-based reranking for ASSIST mode. Post-retrieval score adjustment
//! only; never model-driven.

use crate::model::FileResult;

pub struct RuleBasedReranker {
    /// Multiplier applied when the whole query appears verbatim in a snippet.
    pub exact_phrase_boost: f32,
    /// Multiplier applied when the query appears in the filename.
    pub filename_boost: f32,
}

impl Default for RuleBasedReranker {
    fn default() -> Self {
        RuleBasedReranker {
            exact_phrase_boost: 0.25,
            filename_boost: 0.15,
        }
    }
}

impl RuleBasedReranker {
    pub fn rerank(&self, results: &mut [FileResult], query: &str) {
        let phrase = query.trim().to_lowercase();
        if phrase.chars().count() < 3 {
            return;
        }
        for result in results.iter_mut() {
            let mut factor = 1.0;
            if result.filename.to_lowercase().contains(&phrase) {
                factor += self.filename_boost;
            }
            if result
                .evidences
                .iter()
                .any(|e| e.snippet.text.to_lowercase().contains(&phrase))
            {
                factor += self.exact_phrase_boost;
            }
            result.final_file_score *= factor;
        }
        results.sort_by(|a, b| {
            b.final_file_score
                .partial_cmp(&a.final_file_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchType;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn result(filename: &str, score: f32) -> FileResult {
        FileResult {
            file_id: Uuid::new_v4(),
            path: PathBuf::from(format!("/docs/{filename}")),
            filename: filename.to_string(),
            extension: "md".to_string(),
            content_available: true,
            match_type: MatchType::Lexical,
            final_file_score: score,
            evidences: vec![],
        }
    }

    #[test]
    fn filename_match_overtakes_a_close_competitor() {
        let mut results = vec![result("other.md", 0.102), result("budget.md", 0.1)];
        RuleBasedReranker::default().rerank(&mut results, "budget");
        assert_eq!(results[0].filename, "budget.md");
    }

    #[test]
    fn short_queries_do_not_rerank() {
        let mut results = vec![result("ab.md", 0.2), result("zz.md", 0.1)];
        RuleBasedReranker::default().rerank(&mut results, "ab");
        assert_eq!(results[0].filename, "ab.md");
        assert_eq!(results[0].final_file_score, 0.2);
    }
}
