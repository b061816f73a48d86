//! Maximal Marginal Relevance (MMR) for diversity-aware selection
//!
//! MMR = λ × relevance + (1 - λ) × (1 - max similarity to selected)
//!
//! λ = 1.0: pure relevance
//! λ = 0.0: pure diversity
//!
//! Relevance is the candidate's effective score; similarity between
//! candidates is token Jaccard over their text.

use super::candidate::Candidate;
use super::text::{jaccard, tokenize};
use ahash::AHashSet;

/// Select up to `k` candidates by MMR. The most relevant candidate is always
/// picked first; ties go to the earlier candidate.
pub fn mmr_select(candidates: Vec<Candidate>, k: usize, lambda: f32) -> Vec<Candidate> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let k = k.min(candidates.len());

    let mut remaining: Vec<(Candidate, AHashSet<String>)> = candidates
        .into_iter()
        .map(|c| {
            let tokens = tokenize(&c.text);
            (c, tokens)
        })
        .collect();
    let mut selected: Vec<(Candidate, AHashSet<String>)> = Vec::with_capacity(k);

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_mmr = f32::NEG_INFINITY;

        for (idx, (candidate, tokens)) in remaining.iter().enumerate() {
            let relevance = candidate.effective_score();
            let mmr_score = if selected.is_empty() {
                relevance
            } else {
                let max_similarity = selected
                    .iter()
                    .map(|(_, s)| jaccard(tokens, s))
                    .fold(0.0, f32::max);
                lambda * relevance + (1.0 - lambda) * (1.0 - max_similarity)
            };

            if mmr_score > best_mmr {
                best_mmr = mmr_score;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected.into_iter().map(|(c, _)| c).collect()
}
