//! Read-only diagnostics over the trained exemplars.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::{QualityConfig, ScoringConfig, SimilarityWeights};
use super::exemplar::TrainedTraits;
use super::scoring::consistency_score;
use super::threshold::pairwise_similarities;
use super::vector::mean_and_variance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueQuality {
    pub sample_count: usize,
    /// Mean pairwise similarity, `None` with fewer than two samples
    pub average_similarity: Option<f32>,
    pub variance: f32,
    pub consistency: f32,
    pub sufficiency: f32,
    pub quality: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryQuality {
    pub values: BTreeMap<String, ValueQuality>,
    /// Mean quality of the category's trait values, 0 for an untrained category
    pub quality: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Recommendation {
    NoTrainingData {
        category: String,
    },
    InsufficientSamples {
        category: String,
        trait_value: String,
        count: usize,
        minimum: usize,
    },
    InconsistentExamples {
        category: String,
        trait_value: String,
        variance: f32,
    },
    LowDiversity {
        category: String,
        trait_value: String,
        average_similarity: f32,
    },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTrainingData { category } => {
                write!(f, "'{}' has no trained values yet", category)
            }
            Self::InsufficientSamples {
                category,
                trait_value,
                count,
                minimum,
            } => write!(
                f,
                "'{}' / '{}' has {} example(s); add at least {} more",
                category,
                trait_value,
                count,
                minimum.saturating_sub(*count)
            ),
            Self::InconsistentExamples {
                category,
                trait_value,
                variance,
            } => write!(
                f,
                "'{}' / '{}' examples look inconsistent (variance {:.3}); remove outliers",
                category, trait_value, variance
            ),
            Self::LowDiversity {
                category,
                trait_value,
                average_similarity,
            } => write!(
                f,
                "'{}' / '{}' examples are near-identical (similarity {:.3}); add more varied images",
                category, trait_value, average_similarity
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub categories: BTreeMap<String, CategoryQuality>,
    /// Mean quality over categories, 0 when nothing is trained
    pub overall_quality: f32,
    pub recommendations: Vec<Recommendation>,
}

/// Builds a quality report without touching any store.
pub fn analyze(
    traits: &TrainedTraits,
    quality: &QualityConfig,
    scoring: &ScoringConfig,
    weights: &SimilarityWeights,
) -> TrainingReport {
    let mut categories = BTreeMap::new();
    let mut recommendations = Vec::new();

    for (category, values) in traits.categories() {
        if values.is_empty() {
            recommendations.push(Recommendation::NoTrainingData {
                category: category.clone(),
            });
        }

        let mut value_reports = BTreeMap::new();
        for (trait_value, exemplars) in values {
            let count = exemplars.len();
            let similarities = pairwise_similarities(exemplars, weights);
            let (average, variance) = mean_and_variance(&similarities);
            let average_similarity = (!similarities.is_empty()).then_some(average);
            let consistency = consistency_score(variance, scoring.consistency_amplification);
            let sufficiency = (count as f32 / quality.target_count as f32).min(1.0);
            let value_quality =
                quality.consistency_weight * consistency + (1.0 - quality.consistency_weight) * sufficiency;

            if count < quality.min_count {
                recommendations.push(Recommendation::InsufficientSamples {
                    category: category.clone(),
                    trait_value: trait_value.clone(),
                    count,
                    minimum: quality.min_count,
                });
            }
            if variance > quality.max_variance {
                recommendations.push(Recommendation::InconsistentExamples {
                    category: category.clone(),
                    trait_value: trait_value.clone(),
                    variance,
                });
            }
            if let Some(avg) = average_similarity {
                if avg > quality.near_identical_similarity {
                    recommendations.push(Recommendation::LowDiversity {
                        category: category.clone(),
                        trait_value: trait_value.clone(),
                        average_similarity: avg,
                    });
                }
            }

            value_reports.insert(
                trait_value.clone(),
                ValueQuality {
                    sample_count: count,
                    average_similarity,
                    variance,
                    consistency,
                    sufficiency,
                    quality: value_quality,
                },
            );
        }

        let category_quality = if value_reports.is_empty() {
            0.0
        } else {
            value_reports.values().map(|v| v.quality).sum::<f32>() / value_reports.len() as f32
        };
        categories.insert(
            category.clone(),
            CategoryQuality {
                values: value_reports,
                quality: category_quality,
            },
        );
    }

    let overall_quality = if categories.is_empty() {
        0.0
    } else {
        categories.values().map(|c| c.quality).sum::<f32>() / categories.len() as f32
    };

    TrainingReport {
        categories,
        overall_quality,
        recommendations,
    }
}
