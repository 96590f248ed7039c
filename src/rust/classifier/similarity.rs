//! Pairwise similarity between feature vectors.
//!
//! Every metric is mapped into `[0, 1]` with 1 meaning identical:
//! - cosine is computed raw in `[-1, 1]` and clamped at 0
//! - euclidean uses `1 / (1 + ‖a - b‖₂)`
//! - manhattan uses `1 / (1 + ‖a - b‖₁ / √n)`, scaled by `√n` so it stays
//!   comparable to the euclidean term as the embedding dimension grows

use log::warn;
use serde::{Deserialize, Serialize};

use super::config::SimilarityWeights;
use super::vector::FeatureVector;

const COSINE_EPSILON: f32 = 1e-8;

/// Per-metric similarity between two vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScores {
    /// Raw cosine in `[-1, 1]`
    pub cosine: f32,
    pub euclidean: f32,
    pub manhattan: f32,
    /// Weighted blend of the clamped cosine, euclidean and manhattan scores
    pub composite: f32,
}

impl SimilarityScores {
    /// The neutral result reported for vectors that cannot be compared
    pub const NEUTRAL: Self = Self {
        cosine: 0.0,
        euclidean: 0.0,
        manhattan: 0.0,
        composite: 0.0,
    };
}

/// Computes every metric between `a` and `b`.
///
/// Vectors of different lengths are not an error: a warning is logged and
/// [`SimilarityScores::NEUTRAL`] is returned, so one malformed exemplar cannot
/// abort a classification pass.
pub fn similarity(a: &FeatureVector, b: &FeatureVector, weights: &SimilarityWeights) -> SimilarityScores {
    if a.len() != b.len() || a.is_empty() {
        warn!(
            "Cannot compare feature vectors of length {} and {}; using neutral similarity",
            a.len(),
            b.len()
        );
        return SimilarityScores::NEUTRAL;
    }

    let a = a.as_array();
    let b = b.as_array();
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    let mut squared = 0.0_f32;
    let mut absolute = 0.0_f32;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
        let diff = x - y;
        squared += diff * diff;
        absolute += diff.abs();
    }

    let denominator = (norm_a.sqrt() * norm_b.sqrt()).max(COSINE_EPSILON);
    let cosine = (dot / denominator).clamp(-1.0, 1.0);
    let euclidean = 1.0 / (1.0 + squared.sqrt());
    let manhattan = 1.0 / (1.0 + absolute / (a.len() as f32).sqrt());
    let composite = weights.cosine * cosine.max(0.0)
        + weights.euclidean * euclidean
        + weights.manhattan * manhattan;

    SimilarityScores {
        cosine,
        euclidean,
        manhattan,
        composite: composite.clamp(0.0, 1.0),
    }
}

/// Composite similarity with the given weights
pub fn composite_similarity(a: &FeatureVector, b: &FeatureVector, weights: &SimilarityWeights) -> f32 {
    similarity(a, b, weights).composite
}

/// Raw cosine similarity in `[-1, 1]`, zero on length mismatch
pub fn cosine_similarity(a: &FeatureVector, b: &FeatureVector) -> f32 {
    similarity(a, b, &SimilarityWeights::default()).cosine
}
