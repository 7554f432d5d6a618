//! Similarity computation for embeddings.
//!
//! Vectors are stored as `f32` but accumulated in `f64`, so long vectors
//! keep enough precision for six significant digits in the output.

use crate::error::{EmbeddingError, Result};

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
///
/// A zero-norm input has no direction and yields
/// [`EmbeddingError::DegenerateVector`], as does any input whose similarity
/// is not a finite number.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    let dot = dot_product(a, b)?;
    let magnitude_a = norm(a);
    let magnitude_b = norm(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Err(EmbeddingError::DegenerateVector);
    }

    let cosine = dot / (magnitude_a * magnitude_b);
    if !cosine.is_finite() {
        return Err(EmbeddingError::DegenerateVector);
    }

    // Rounding can push |cos| a hair past 1 for near-parallel vectors.
    Ok(cosine.clamp(-1.0, 1.0))
}

/// Compute the dot product between two embeddings.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum())
}

/// Euclidean length of an embedding.
pub fn norm(v: &[f32]) -> f64 {
    v.iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt()
}
