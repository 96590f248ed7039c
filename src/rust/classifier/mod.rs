mod error;
pub mod config;
mod vector;
pub mod similarity;
mod exemplar;
mod scoring;
mod threshold;
mod feedback;
mod quality;
mod preprocess;
mod extractor;
mod engine;
pub mod builder;
mod batch;

use serde::Serialize;

pub use error::ClassifierError;
pub use config::{
    BatchConfig, EngineConfig, FeedbackConfig, QualityConfig, ScoringConfig, SimilarityWeights, ThresholdConfig,
};
pub use vector::FeatureVector;
pub use similarity::{composite_similarity, cosine_similarity, similarity, SimilarityScores};
pub use exemplar::{Exemplar, TraitExemplars, TrainedTraits};
pub use scoring::{
    classify, consistency_score, score_trait_value, ClassificationResult, MatchSource, TraitScore, NOT_DETECTED,
};
pub use threshold::{category_stats, CategoryStats, ThresholdManager};
pub use feedback::{FeedbackCorrection, FeedbackStore};
pub use quality::{analyze, CategoryQuality, Recommendation, TrainingReport, ValueQuality};
pub use preprocess::{augment_image, augment_variants, AugmentOptions, NormalizedImage, Preprocessor};
pub use extractor::{FeatureExtractor, OnnxFeatureExtractor};
pub use engine::TraitEngine;
pub use builder::TraitEngineBuilder;
pub use batch::{BatchInput, BatchOutcome, CancellationFlag, ImageLabels, ImageSource};

/// Information about the current state of a trait engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    /// Registered categories, in name order
    pub categories: Vec<String>,
    /// Number of trait values across all categories
    pub trait_values: usize,
    /// Number of stored exemplars
    pub exemplars: usize,
    /// Number of stored feedback corrections
    pub corrections: usize,
    /// Feature vectors currently owned by the engine
    pub live_vectors: usize,
    /// Size of the vectors the attached extractor produces, if any
    pub embedding_size: Option<usize>,
}
