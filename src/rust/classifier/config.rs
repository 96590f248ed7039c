use serde::{Deserialize, Serialize};

use super::error::ClassifierError;

const WEIGHT_TOLERANCE: f32 = 1e-3;

/// Weights used to blend the per-metric similarities into the composite score.
///
/// The default blend (cosine 0.5, euclidean 0.3, manhattan 0.2) is what the
/// default threshold band is calibrated against. Changing it shifts every
/// composite score, so thresholds should be revisited together with it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub cosine: f32,
    pub euclidean: f32,
    pub manhattan: f32,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            cosine: 0.5,
            euclidean: 0.3,
            manhattan: 0.2,
        }
    }
}

/// Consensus scoring used by the trait classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of the best single-exemplar similarity
    pub max_weight: f32,
    /// Weight of the mean similarity over the trait value's exemplars
    pub avg_weight: f32,
    /// Weight of the consistency score
    pub consistency_weight: f32,
    /// Amplification `k` in `consistency = max(0, 1 - sqrt(variance * k))`
    pub consistency_amplification: f32,
    /// A detected match needs at least this consistency
    pub min_consistency: f32,
    /// A detected match needs its best exemplar similarity at least this high
    pub min_similarity: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_weight: 0.5,
            avg_weight: 0.3,
            consistency_weight: 0.2,
            consistency_amplification: 2.0,
            min_consistency: 0.60,
            min_similarity: 0.70,
        }
    }
}

/// Constants for per-category adaptive thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub base: f32,
    pub floor: f32,
    pub ceiling: f32,
    /// Used for categories that have never been recomputed
    pub default: f32,
    pub low_variance: f32,
    pub low_variance_adjustment: f32,
    pub moderate_variance: f32,
    pub moderate_variance_adjustment: f32,
    pub high_variance: f32,
    pub high_variance_adjustment: f32,
    /// Minimum exemplars per trait value for the well-populated reduction
    pub well_populated: usize,
    pub well_populated_adjustment: f32,
    /// Below this many exemplars in any trait value the threshold is raised
    pub under_populated: usize,
    pub under_populated_adjustment: f32,
    /// Reduction per stored feedback correction
    pub feedback_step: f32,
    /// Upper bound of the total feedback reduction
    pub feedback_cap: f32,
    /// Immediate reduction applied when a correction arrives
    pub feedback_nudge: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            base: 0.78,
            floor: 0.65,
            ceiling: 0.88,
            default: 0.78,
            low_variance: 0.02,
            low_variance_adjustment: -0.04,
            moderate_variance: 0.06,
            moderate_variance_adjustment: -0.02,
            high_variance: 0.15,
            high_variance_adjustment: 0.05,
            well_populated: 8,
            well_populated_adjustment: -0.02,
            under_populated: 3,
            under_populated_adjustment: 0.05,
            feedback_step: 0.005,
            feedback_cap: 0.03,
            feedback_nudge: 0.01,
        }
    }
}

impl ThresholdConfig {
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.floor, self.ceiling)
    }
}

/// Bounded feedback memory and override policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Maximum stored corrections per category; the oldest is evicted first
    pub capacity: usize,
    /// Composite similarity a stored correction must exceed to override
    pub override_similarity: f32,
    pub confidence_bonus: f32,
    pub confidence_cap: f32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            override_similarity: 0.80,
            confidence_bonus: 0.10,
            confidence_cap: 0.98,
        }
    }
}

/// Rules for the training quality report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Sample count at which the sufficiency term saturates
    pub target_count: usize,
    /// Fewer samples than this produce a recommendation
    pub min_count: usize,
    /// Variance above this is reported as inconsistent
    pub max_variance: f32,
    /// Average similarity above this is reported as lacking diversity
    pub near_identical_similarity: f32,
    /// Share of consistency in the per-value quality; the rest is sufficiency
    pub consistency_weight: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            target_count: 6,
            min_count: 3,
            max_variance: 0.06,
            near_identical_similarity: 0.98,
            consistency_weight: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Images classified between two cooperative yields
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { batch_size: 4 }
    }
}

/// All tunable constants of the engine in one place.
///
/// Every field has a default, so a JSON file only needs the values it overrides:
///
/// ```
/// use traitlens::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{ "feedback": { "capacity": 80 } }"#).unwrap();
/// assert_eq!(config.feedback.capacity, 80);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub similarity: SimilarityWeights,
    pub scoring: ScoringConfig,
    pub threshold: ThresholdConfig,
    pub feedback: FeedbackConfig,
    pub quality: QualityConfig,
    pub batch: BatchConfig,
}

impl EngineConfig {
    /// Loads a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ClassifierError::ValidationError(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            ClassifierError::ValidationError(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the constants are internally consistent.
    ///
    /// A perfect match scores 1.0 on every component, so the threshold ceiling and
    /// the classifier floors must stay at or below 1.0 for a perfect match to be accepted.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        let sim = &self.similarity;
        check_weights("similarity", &[sim.cosine, sim.euclidean, sim.manhattan])?;

        let scoring = &self.scoring;
        check_weights(
            "scoring",
            &[scoring.max_weight, scoring.avg_weight, scoring.consistency_weight],
        )?;
        if scoring.consistency_amplification <= 0.0 {
            return Err(ClassifierError::ValidationError(
                "Consistency amplification must be positive".into(),
            ));
        }
        check_unit("min_consistency", scoring.min_consistency)?;
        check_unit("min_similarity", scoring.min_similarity)?;

        let threshold = &self.threshold;
        if threshold.floor > threshold.ceiling {
            return Err(ClassifierError::ValidationError(format!(
                "Threshold floor {} exceeds ceiling {}",
                threshold.floor, threshold.ceiling
            )));
        }
        check_unit("threshold ceiling", threshold.ceiling)?;
        check_unit("threshold floor", threshold.floor)?;
        if threshold.default < threshold.floor || threshold.default > threshold.ceiling {
            return Err(ClassifierError::ValidationError(format!(
                "Default threshold {} is outside [{}, {}]",
                threshold.default, threshold.floor, threshold.ceiling
            )));
        }
        if threshold.feedback_cap < 0.0 || threshold.feedback_step < 0.0 || threshold.feedback_nudge < 0.0 {
            return Err(ClassifierError::ValidationError(
                "Feedback threshold adjustments must not be negative".into(),
            ));
        }

        let feedback = &self.feedback;
        if feedback.capacity == 0 {
            return Err(ClassifierError::ValidationError(
                "Feedback capacity must be at least 1".into(),
            ));
        }
        check_unit("override_similarity", feedback.override_similarity)?;
        check_unit("confidence_cap", feedback.confidence_cap)?;

        let quality = &self.quality;
        if quality.target_count == 0 {
            return Err(ClassifierError::ValidationError(
                "Quality target count must be at least 1".into(),
            ));
        }
        check_unit("quality consistency_weight", quality.consistency_weight)?;

        if self.batch.batch_size == 0 {
            return Err(ClassifierError::ValidationError(
                "Batch size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn check_weights(group: &str, weights: &[f32]) -> Result<(), ClassifierError> {
    if weights.iter().any(|w| *w < 0.0) {
        return Err(ClassifierError::ValidationError(format!(
            "{} weights must not be negative",
            group
        )));
    }
    let sum: f32 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ClassifierError::ValidationError(format!(
            "{} weights must sum to 1.0 (got {:.4})",
            group, sum
        )));
    }
    Ok(())
}

fn check_unit(name: &str, value: f32) -> Result<(), ClassifierError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ClassifierError::ValidationError(format!(
            "{} must be within [0, 1] (got {})",
            name, value
        )));
    }
    Ok(())
}
