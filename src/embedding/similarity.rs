//! Vector similarity.

use crate::error::EmbeddingError;

use super::Embedding;

/// Computes cosine similarity between two vectors.
///
/// Ranges from -1 (opposite) to 1 (same direction). A zero vector is
/// treated as orthogonal to everything and yields 0.
///
/// # Errors
///
/// Returns `EmbeddingError::DimensionMismatch` when the lengths differ.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> Result<f64, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();
    if norm_a < 1e-10 || norm_b < 1e-10 {
        return Ok(0.0);
    }

    Ok((a.dot(b) / (norm_a * norm_b)).clamp(-1.0, 1.0))
}
