//! Reciprocal Rank Fusion algorithm for combining ranked lists

use ahash::AHashMap;
use std::hash::Hash;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("Invalid RRF constant {0}: must be finite and non-negative")]
    InvalidK(f32),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,
}

impl FusionConfig {
    pub fn new(rrf_k: f32) -> Result<Self, FusionError> {
        if !rrf_k.is_finite() || rrf_k < 0.0 {
            return Err(FusionError::InvalidK(rrf_k));
        }
        Ok(Self { rrf_k })
    }

    /// Highest fused score attainable over `lists` lists: first place in each
    pub fn max_score(&self, lists: usize) -> f32 {
        lists as f32 / (self.rrf_k + 1.0)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { rrf_k: 60.0 }
    }
}

/// Apply Reciprocal Rank Fusion to any number of ranked lists
///
/// RRF formula: score(id) = sum over lists containing id of 1 / (k + rank + 1),
/// with 0-based rank. Lists contribute nothing for ids they lack.
///
/// # Returns
/// `(id, fused_score)` pairs sorted by score descending. Ties keep the order
/// in which ids were first seen.
pub fn reciprocal_rank_fusion<T>(lists: &[Vec<T>], config: &FusionConfig) -> Vec<(T, f32)>
where
    T: Eq + Hash + Clone,
{
    let mut index: AHashMap<T, usize> = AHashMap::new();
    let mut fused: Vec<(T, f32)> = Vec::new();

    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            let rrf_score = 1.0 / (config.rrf_k + rank as f32 + 1.0);
            match index.get(id) {
                Some(&slot) => fused[slot].1 += rrf_score,
                None => {
                    index.insert(id.clone(), fused.len());
                    fused.push((id.clone(), rrf_score));
                }
            }
        }
    }

    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}
