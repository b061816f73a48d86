//! Ranking quality metrics
//!
//! `ranked` is a result list in rank order; `relevant` the ids judged
//! relevant. Ranks are 1-based in the formulas, 0-based in code.

use ahash::AHashSet;
use std::hash::Hash;

/// Reciprocal of the rank of the first relevant result; 0 if none
pub fn mrr<T: Eq + Hash>(ranked: &[T], relevant: &[T]) -> f32 {
    let relevant: AHashSet<&T> = relevant.iter().collect();
    ranked
        .iter()
        .position(|id| relevant.contains(id))
        .map(|idx| 1.0 / (idx as f32 + 1.0))
        .unwrap_or(0.0)
}

fn hits_at_k<T: Eq + Hash>(ranked: &[T], relevant: &AHashSet<&T>, k: usize) -> usize {
    ranked.iter().take(k).filter(|id| relevant.contains(id)).count()
}

/// Relevant results in the top `k`, divided by `k`
pub fn precision_at_k<T: Eq + Hash>(ranked: &[T], relevant: &[T], k: usize) -> f32 {
    if k == 0 {
        return 0.0;
    }
    let relevant: AHashSet<&T> = relevant.iter().collect();
    hits_at_k(ranked, &relevant, k) as f32 / k as f32
}

/// Relevant results in the top `k`, divided by the number of relevant ids
pub fn recall_at_k<T: Eq + Hash>(ranked: &[T], relevant: &[T], k: usize) -> f32 {
    let relevant: AHashSet<&T> = relevant.iter().collect();
    if relevant.is_empty() {
        return 0.0;
    }
    hits_at_k(ranked, &relevant, k) as f32 / relevant.len() as f32
}

/// DCG over the top `k` graded relevances: Σ rel_i / log2(i + 2)
pub fn dcg_at_k(relevances: &[f32], k: usize) -> f32 {
    relevances
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, rel)| rel / (i as f32 + 2.0).log2())
        .sum()
}

/// DCG normalized by the DCG of the same relevances in ideal order.
/// `relevances` are graded judgments in result order. 0 when nothing is
/// relevant.
pub fn ndcg_at_k(relevances: &[f32], k: usize) -> f32 {
    let mut ideal = relevances.to_vec();
    ideal.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let ideal_dcg = dcg_at_k(&ideal, k);
    if ideal_dcg <= 0.0 {
        return 0.0;
    }
    dcg_at_k(relevances, k) / ideal_dcg
}
