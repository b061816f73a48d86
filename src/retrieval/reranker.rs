//! Heuristic reranking

use super::candidate::{sort_by_score, Candidate};
use super::text::tokenize;
use crate::config::RerankConfig;

/// Adjusts candidate scores with cheap lexical and structural signals:
/// - boost by the fraction of query terms present in the chunk text
/// - boost decaying with the chunk's position in its source
/// - penalty for very short chunks
#[derive(Debug, Clone)]
pub struct Reranker {
    config: RerankConfig,
}

impl Reranker {
    pub fn new(config: &RerankConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Rerank and truncate to `top_k`
    pub fn rerank(&self, query: &str, candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
        let terms: Vec<String> = tokenize(query).into_iter().collect();

        let mut reranked: Vec<Candidate> = candidates
            .into_iter()
            .map(|mut candidate| {
                let boost = self.boost(&terms, &candidate);
                candidate.rerank_score = Some(candidate.effective_score() + boost);
                candidate
            })
            .collect();

        sort_by_score(&mut reranked);
        reranked.truncate(top_k);
        reranked
    }

    fn boost(&self, terms: &[String], candidate: &Candidate) -> f32 {
        let text = candidate.text.to_lowercase();

        let term_fraction = if terms.is_empty() {
            0.0
        } else {
            terms.iter().filter(|t| text.contains(t.as_str())).count() as f32 / terms.len() as f32
        };

        let position = self.config.position_boost / (1.0 + candidate.position as f32);

        let short = if candidate.text.chars().count() < self.config.short_length {
            self.config.short_penalty
        } else {
            0.0
        };

        self.config.term_boost * term_fraction + position - short
    }
}
