//! Similarity primitives over f32 embeddings

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SimilarityError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// L2 magnitude
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale to unit length. Zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let mag = magnitude(v);
    if mag == 0.0 || !mag.is_finite() {
        return v.to_vec();
    }
    v.iter().map(|x| x / mag).collect()
}

/// Plain dot product, for inputs already known to be normalized
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    check_dims(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Cosine similarity in `[-1, 1]`; 0 when either side has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    check_dims(a, b)?;

    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return Ok(0.0);
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let sim = dot / (mag_a * mag_b);
    if sim.is_finite() {
        Ok(sim.clamp(-1.0, 1.0))
    } else {
        Ok(0.0)
    }
}

fn check_dims(a: &[f32], b: &[f32]) -> Result<(), SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}
