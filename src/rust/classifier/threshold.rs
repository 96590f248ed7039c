//! Per-category acceptance thresholds derived from training-data quality.

use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::config::{SimilarityWeights, ThresholdConfig};
use super::exemplar::{Exemplar, TraitExemplars};
use super::similarity::composite_similarity;
use super::vector::mean_and_variance;

/// Intra-class statistics of one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Mean composite similarity over all exemplar pairs that share a trait value
    pub average_intra_class_similarity: f32,
    pub variance: f32,
    pub pair_count: usize,
    pub sample_count: usize,
}

/// Pairwise similarities between exemplars of the same trait value
pub(crate) fn pairwise_similarities(exemplars: &[Exemplar], weights: &SimilarityWeights) -> Vec<f32> {
    let mut similarities = Vec::new();
    for (i, a) in exemplars.iter().enumerate() {
        for b in &exemplars[i + 1..] {
            similarities.push(composite_similarity(&a.vector, &b.vector, weights));
        }
    }
    similarities
}

/// Computes intra-class statistics, pooling pairs within every trait value.
///
/// Returns `None` when the category has no pair of exemplars sharing a trait value.
pub fn category_stats(values: &TraitExemplars, weights: &SimilarityWeights) -> Option<CategoryStats> {
    let mut similarities = Vec::new();
    let mut sample_count = 0;
    for exemplars in values.values() {
        sample_count += exemplars.len();
        similarities.extend(pairwise_similarities(exemplars, weights));
    }
    if similarities.is_empty() {
        return None;
    }
    let (average, variance) = mean_and_variance(&similarities);
    Some(CategoryStats {
        average_intra_class_similarity: average,
        variance,
        pair_count: similarities.len(),
        sample_count,
    })
}

/// Holds one acceptance threshold per category.
///
/// Thresholds are recomputed from scratch whenever a category's exemplars or
/// feedback change. The feedback nudge is applied on top of the last computed
/// base, never on top of a previous nudge.
#[derive(Debug, Clone)]
pub struct ThresholdManager {
    config: ThresholdConfig,
    thresholds: HashMap<String, f32>,
    // Last computed value per category, before any nudge
    base: HashMap<String, f32>,
    stats: HashMap<String, CategoryStats>,
}

impl ThresholdManager {
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config,
            thresholds: HashMap::new(),
            base: HashMap::new(),
            stats: HashMap::new(),
        }
    }

    /// Current threshold of a category, or the default if it was never computed
    pub fn threshold(&self, category: &str) -> f32 {
        self.thresholds
            .get(category)
            .copied()
            .unwrap_or(self.config.default)
    }

    pub fn stats(&self, category: &str) -> Option<CategoryStats> {
        self.stats.get(category).copied()
    }

    /// Recomputes a category's threshold from its exemplars and feedback volume.
    ///
    /// Categories with fewer than two exemplars fall back to their last computed
    /// (or default) threshold, dropping any nudge, and `None` is returned.
    pub fn recompute(
        &mut self,
        category: &str,
        values: &TraitExemplars,
        feedback_count: usize,
        weights: &SimilarityWeights,
    ) -> Option<f32> {
        let total: usize = values.values().map(Vec::len).sum();
        if total < 2 {
            debug!(
                "Skipping threshold recomputation for '{}': {} exemplar(s)",
                category, total
            );
            match self.base.get(category).copied() {
                Some(base) => self.thresholds.insert(category.to_string(), base),
                None => self.thresholds.remove(category),
            };
            return None;
        }

        let stats = category_stats(values, weights);
        let min_per_value = values.values().map(Vec::len).min().unwrap_or(0);
        let threshold = self.compute(stats.map(|s| s.variance), min_per_value, feedback_count);

        match stats {
            Some(stats) => {
                self.stats.insert(category.to_string(), stats);
            }
            None => {
                self.stats.remove(category);
            }
        }
        self.base.insert(category.to_string(), threshold);
        let previous = self.thresholds.insert(category.to_string(), threshold);
        info!(
            "Threshold for '{}' recomputed: {:.4} (was {:.4}, variance {:?}, min samples {}, feedback {})",
            category,
            threshold,
            previous.unwrap_or(self.config.default),
            stats.map(|s| s.variance),
            min_per_value,
            feedback_count
        );
        Some(threshold)
    }

    /// Pure threshold policy: base plus additive adjustments, clamped to the band
    pub fn compute(&self, variance: Option<f32>, min_per_value: usize, feedback_count: usize) -> f32 {
        let c = &self.config;
        let mut threshold = c.base;

        if let Some(variance) = variance {
            if variance < c.low_variance {
                threshold += c.low_variance_adjustment;
            } else if variance < c.moderate_variance {
                threshold += c.moderate_variance_adjustment;
            } else if variance > c.high_variance {
                threshold += c.high_variance_adjustment;
            }
        }

        if min_per_value >= c.well_populated {
            threshold += c.well_populated_adjustment;
        } else if min_per_value < c.under_populated {
            threshold += c.under_populated_adjustment;
        }

        threshold -= (feedback_count as f32 * c.feedback_step).min(c.feedback_cap);

        c.clamp(threshold)
    }

    /// Lowers a category's threshold slightly right after feedback arrives.
    ///
    /// The nudge is taken from the last computed base, so repeated calls
    /// without a recomputation in between do not stack.
    pub fn nudge(&mut self, category: &str) -> f32 {
        let base = self.base.get(category).copied().unwrap_or(self.config.default);
        let nudged = (base - self.config.feedback_nudge).max(self.config.floor);
        self.thresholds.insert(category.to_string(), nudged);
        debug!("Threshold for '{}' nudged to {:.4}", category, nudged);
        nudged
    }

    /// Drops a category's threshold and statistics
    pub fn forget(&mut self, category: &str) {
        self.thresholds.remove(category);
        self.base.remove(category);
        self.stats.remove(category);
    }

    pub fn clear(&mut self) {
        self.thresholds.clear();
        self.base.clear();
        self.stats.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::vector::FeatureVector;

    fn manager() -> ThresholdManager {
        ThresholdManager::new(ThresholdConfig::default())
    }

    fn value_set(vectors: &[&[f32]]) -> Vec<Exemplar> {
        vectors
            .iter()
            .enumerate()
            .map(|(i, v)| Exemplar::new(FeatureVector::from(v.to_vec()), format!("{}.png", i)))
            .collect()
    }

    #[test]
    fn test_single_exemplar_keeps_default() {
        let mut m = manager();
        let mut values = TraitExemplars::new();
        values.insert("Red".into(), value_set(&[&[1.0, 0.0]]));
        assert!(m.recompute("Background", &values, 0, &SimilarityWeights::default()).is_none());
        assert_eq!(m.threshold("Background"), ThresholdConfig::default().default);
    }

    #[test]
    fn test_threshold_stays_in_band() {
        let m = manager();
        let c = ThresholdConfig::default();
        for variance in [0.0, 0.01, 0.05, 0.1, 0.5, 1.0] {
            for count in [1, 2, 5, 8, 20] {
                for feedback in [0, 3, 100] {
                    let t = m.compute(Some(variance), count, feedback);
                    assert!(t >= c.floor && t <= c.ceiling, "{} out of band", t);
                }
            }
        }
    }

    #[test]
    fn test_variance_never_lowers_threshold() {
        let m = manager();
        let variances = [0.0, 0.01, 0.019, 0.02, 0.05, 0.06, 0.1, 0.15, 0.16, 0.4];
        for count in [2, 4, 8] {
            let thresholds: Vec<f32> = variances.iter().map(|v| m.compute(Some(*v), count, 0)).collect();
            for pair in thresholds.windows(2) {
                assert!(pair[1] >= pair[0], "{:?}", thresholds);
            }
        }
    }

    #[test]
    fn test_under_populated_raises_threshold() {
        let m = manager();
        assert!(m.compute(Some(0.08), 2, 0) > m.compute(Some(0.08), 5, 0));
        assert!(m.compute(Some(0.08), 8, 0) < m.compute(Some(0.08), 5, 0));
    }

    #[test]
    fn test_feedback_reduction_is_capped() {
        let m = manager();
        let base = m.compute(Some(0.08), 5, 0);
        let some = m.compute(Some(0.08), 5, 2);
        let many = m.compute(Some(0.08), 5, 1000);
        assert!(some < base);
        assert!((base - many - ThresholdConfig::default().feedback_cap).abs() < 1e-6);
    }

    #[test]
    fn test_recompute_records_stats() {
        let mut m = manager();
        let mut values = TraitExemplars::new();
        values.insert("Red".into(), value_set(&[&[1.0, 0.0], &[1.0, 0.0], &[1.0, 0.0]]));
        let t = m.recompute("Background", &values, 0, &SimilarityWeights::default()).unwrap();
        let stats = m.stats("Background").unwrap();
        assert_eq!(stats.pair_count, 3);
        assert!(stats.variance < 1e-6);
        assert_eq!(m.threshold("Background"), t);
    }

    #[test]
    fn test_nudges_do_not_stack() {
        let mut m = manager();
        let c = ThresholdConfig::default();
        for _ in 0..100 {
            m.nudge("Background");
        }
        assert!((m.threshold("Background") - (c.default - c.feedback_nudge)).abs() < 1e-6);

        // A skipped recomputation restores the un-nudged value
        let mut values = TraitExemplars::new();
        values.insert("Red".into(), value_set(&[&[1.0, 0.0]]));
        assert!(m.recompute("Background", &values, 100, &SimilarityWeights::default()).is_none());
        assert_eq!(m.threshold("Background"), c.default);
    }

    #[test]
    fn test_nudge_respects_floor() {
        let mut m = ThresholdManager::new(ThresholdConfig {
            default: 0.655,
            ..ThresholdConfig::default()
        });
        m.nudge("Background");
        assert_eq!(m.threshold("Background"), ThresholdConfig::default().floor);
    }
}
