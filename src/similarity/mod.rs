//! Embedding and similarity engine.
//!
//! Turns request text into a fixed-size [`Fingerprint`] and compares
//! fingerprints with clamped cosine similarity. Embedders implement
//! [`TextEmbedder`]; the default [`HashingEmbedder`] is pure CPU work with
//! no model files, so it can run on every request.

pub mod hashing;
#[cfg(feature = "local-inference")]
pub mod neural;

pub use hashing::HashingEmbedder;
#[cfg(feature = "local-inference")]
pub use neural::{FastEmbedEmbedder, LocalEmbeddingModel};

use std::sync::Arc;

use crate::Result;

/// Fixed-length vector derived from request text.
///
/// Compared only by similarity, never by equality.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint(Arc<[f32]>);

impl Fingerprint {
    /// Wrap raw values, L2-normalizing them. An all-zero vector stays zero.
    pub fn new(values: Vec<f32>) -> Self {
        let mut values = values;
        normalize(&mut values);
        Self(values.into())
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Cosine similarity with another fingerprint, in `[0, 1]`.
    pub fn similarity(&self, other: &Fingerprint) -> f32 {
        cosine_similarity(&self.0, &other.0)
    }
}

/// Converts text into a fingerprint.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector.
pub trait TextEmbedder: Send + Sync {
    /// Embedder name for logging/debugging.
    fn name(&self) -> &str;

    /// Length of every fingerprint this embedder produces.
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Fingerprint>;
}

/// Cosine similarity clamped to `[0, 1]`.
///
/// Opposite directions clamp to 0.0. Mismatched lengths and zero vectors
/// also yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    (cosine as f32).clamp(0.0, 1.0)
}

fn normalize(values: &mut [f32]) {
    let norm = values
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v = (f64::from(*v) / norm) as f32;
        }
    }
}

/// Shared handle to an embedder.
pub type SharedEmbedder = Arc<dyn TextEmbedder>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_are_fully_similar() {
        let a = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn opposite_vectors_clamp_to_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]), 0.0);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn fingerprint_is_unit_length() {
        let fp = Fingerprint::new(vec![3.0, 4.0]);
        assert!((fp.values()[0] - 0.6).abs() < 1e-6);
        assert!((fp.values()[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn scaling_does_not_change_similarity() {
        let a = Fingerprint::new(vec![1.0, 2.0, 3.0]);
        let b = Fingerprint::new(vec![10.0, 20.0, 30.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }
}
