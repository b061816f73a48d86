//! Near-duplicate removal among candidates

use super::candidate::Candidate;
use super::text::{jaccard, tokenize};
use ahash::AHashSet;

/// True when `a` and `b` come from the same source, sit at the same or
/// adjacent positions, and their token overlap reaches `threshold`
pub fn is_near_duplicate(a: &Candidate, b: &Candidate, threshold: f32) -> bool {
    pair_is_duplicate(a, b, &tokenize(&a.text), &tokenize(&b.text), threshold)
}

fn pair_is_duplicate(
    a: &Candidate,
    b: &Candidate,
    a_tokens: &AHashSet<String>,
    b_tokens: &AHashSet<String>,
    threshold: f32,
) -> bool {
    if a.chunk_id == b.chunk_id {
        return true;
    }
    a.source_id == b.source_id
        && a.position.abs_diff(b.position) <= 1
        && jaccard(a_tokens, b_tokens) >= threshold
}

/// Deduplicate candidates, keeping the higher-scored member of every
/// near-duplicate pair. Survivors keep their input order.
pub fn deduplicate(candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
    if candidates.len() < 2 {
        return candidates;
    }

    let tokens: Vec<AHashSet<String>> = candidates.iter().map(|c| tokenize(&c.text)).collect();

    // visit highest score first so the better copy is the one kept
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .effective_score()
            .partial_cmp(&candidates[a].effective_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<usize> = Vec::new();
    for &i in &order {
        let duplicate = kept.iter().any(|&j| {
            pair_is_duplicate(&candidates[i], &candidates[j], &tokens[i], &tokens[j], threshold)
        });
        if !duplicate {
            kept.push(i);
        }
    }

    let keep: AHashSet<usize> = kept.into_iter().collect();
    candidates
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, c)| c)
        .collect()
}
