//! Consensus scoring of a target vector against a category's exemplars.

use log::debug;
use serde::{Deserialize, Serialize};

use super::config::{ScoringConfig, SimilarityWeights};
use super::exemplar::{Exemplar, TraitExemplars};
use super::similarity::composite_similarity;
use super::vector::{mean_and_variance, FeatureVector};

/// Label reported when no trait value is a confident match.
pub const NOT_DETECTED: &str = "Not Detected";

/// Where a classification decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchSource {
    /// Scored against the trained exemplars
    Exemplars,
    /// Overridden by a stored user correction
    Feedback,
}

/// Outcome of classifying one image against one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// The matched trait value or [`NOT_DETECTED`]
    pub label: String,
    pub confidence: f32,
    /// Best single-exemplar similarity of the candidate
    pub similarity: f32,
    pub consistency_score: f32,
    /// Best-scoring trait value, kept even when it was rejected
    pub candidate: Option<String>,
    pub source: MatchSource,
}

impl ClassificationResult {
    pub fn is_detected(&self) -> bool {
        self.label != NOT_DETECTED
    }

    /// A rejected result with zeroed scores, used when an image could not be processed
    pub fn not_detected() -> Self {
        Self {
            label: NOT_DETECTED.to_string(),
            confidence: 0.0,
            similarity: 0.0,
            consistency_score: 0.0,
            candidate: None,
            source: MatchSource::Exemplars,
        }
    }
}

/// Scores of one trait value's exemplar set against a target.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitScore {
    pub trait_value: String,
    pub max_similarity: f32,
    pub avg_similarity: f32,
    pub variance: f32,
    pub consistency_score: f32,
    pub composite_score: f32,
}

/// `max(0, 1 - sqrt(variance * k))`
pub fn consistency_score(variance: f32, amplification: f32) -> f32 {
    (1.0 - (variance.max(0.0) * amplification).sqrt()).max(0.0)
}

/// Scores a target against one trait value's exemplars.
///
/// Returns `None` for an empty exemplar list.
pub fn score_trait_value(
    trait_value: &str,
    target: &FeatureVector,
    exemplars: &[Exemplar],
    weights: &SimilarityWeights,
    scoring: &ScoringConfig,
) -> Option<TraitScore> {
    if exemplars.is_empty() {
        return None;
    }
    let similarities: Vec<f32> = exemplars
        .iter()
        .map(|e| composite_similarity(target, &e.vector, weights))
        .collect();

    let max_similarity = similarities.iter().copied().fold(f32::MIN, f32::max);
    let (avg_similarity, variance) = mean_and_variance(&similarities);
    let consistency = consistency_score(variance, scoring.consistency_amplification);
    let composite_score = scoring.max_weight * max_similarity
        + scoring.avg_weight * avg_similarity
        + scoring.consistency_weight * consistency;

    Some(TraitScore {
        trait_value: trait_value.to_string(),
        max_similarity,
        avg_similarity,
        variance,
        consistency_score: consistency,
        composite_score,
    })
}

/// Classifies a target against every trait value of a category.
///
/// Returns `None` only when the category has no exemplars at all. Otherwise the
/// trait value with the highest composite score is the candidate; ties keep the
/// earlier trait value. The candidate is reported as detected only if its
/// composite score reaches `threshold`, its consistency reaches the configured
/// minimum and its best exemplar similarity reaches the configured minimum.
/// A rejected candidate still carries its scores.
pub fn classify(
    category: &str,
    target: &FeatureVector,
    values: &TraitExemplars,
    threshold: f32,
    weights: &SimilarityWeights,
    scoring: &ScoringConfig,
) -> Option<ClassificationResult> {
    let mut best: Option<TraitScore> = None;
    for (trait_value, exemplars) in values {
        let Some(score) = score_trait_value(trait_value, target, exemplars, weights, scoring) else {
            continue;
        };
        debug!(
            "[{}] '{}': max={:.4} avg={:.4} var={:.5} consistency={:.4} composite={:.4}",
            category,
            trait_value,
            score.max_similarity,
            score.avg_similarity,
            score.variance,
            score.consistency_score,
            score.composite_score
        );
        let better = match &best {
            Some(current) => score.composite_score > current.composite_score,
            None => true,
        };
        if better {
            best = Some(score);
        }
    }

    let best = best?;
    let accepted = best.composite_score >= threshold
        && best.consistency_score >= scoring.min_consistency
        && best.max_similarity >= scoring.min_similarity;

    debug!(
        "[{}] candidate '{}' composite={:.4} threshold={:.4} accepted={}",
        category, best.trait_value, best.composite_score, threshold, accepted
    );

    Some(ClassificationResult {
        label: if accepted {
            best.trait_value.clone()
        } else {
            NOT_DETECTED.to_string()
        },
        confidence: best.composite_score,
        similarity: best.max_similarity,
        consistency_score: best.consistency_score,
        candidate: Some(best.trait_value),
        source: MatchSource::Exemplars,
    })
}
