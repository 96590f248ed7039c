//! A few-shot visual trait classifier.
//!
//! Teach the engine a handful of labelled example images per trait value,
//! then label new images by consensus similarity against those exemplars.
//! Each category gets an adaptive acceptance threshold, and user corrections
//! override future decisions on similar images.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use traitlens::{FeatureVector, TraitEngine, NOT_DETECTED};
//!
//! let engine = TraitEngine::builder().add_category("Background")?.build()?;
//! for i in 0..4 {
//!     let jitter = 0.01 * i as f32;
//!     engine.add_exemplar_vector("Background", "Red", FeatureVector::from(vec![1.0, jitter, 0.0]), &format!("red-{}", i), None)?;
//!     engine.add_exemplar_vector("Background", "Blue", FeatureVector::from(vec![0.0, jitter, 1.0]), &format!("blue-{}", i), None)?;
//! }
//!
//! let result = engine.classify_vector("Background", &FeatureVector::from(vec![1.0, 0.0, 0.0])).unwrap();
//! assert_eq!(result.label, "Red");
//!
//! let far = engine.classify_vector("Background", &FeatureVector::from(vec![0.0, -1.0, 0.0])).unwrap();
//! assert_eq!(far.label, NOT_DETECTED);
//! # Ok(())
//! # }
//! ```
//!
//! Images go through a [`FeatureExtractor`]; [`TraitEngineBuilder::with_model`]
//! attaches a built-in ONNX backbone once [`ModelManager`] has downloaded it.
//!
//! # Thread Safety
//!
//! The engine is thread-safe and can be shared across threads using `Arc`:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use std::thread;
//! use traitlens::{FeatureVector, TraitEngine};
//!
//! let engine = Arc::new(TraitEngine::builder().add_category("Hat")?.build()?);
//! engine.add_exemplar_vector("Hat", "Cap", FeatureVector::from(vec![1.0, 0.0]), "cap.png", None)?;
//!
//! let mut handles = vec![];
//! for _ in 0..3 {
//!     let engine = Arc::clone(&engine);
//!     handles.push(thread::spawn(move || {
//!         engine.classify_vector("Hat", &FeatureVector::from(vec![1.0, 0.0]));
//!     }));
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod classifier;
mod runtime;
pub mod model_manager;
pub mod models;

pub use classifier::{
    AugmentOptions, BatchInput, BatchOutcome, CancellationFlag, CategoryStats, ClassificationResult, ClassifierError,
    EngineConfig, EngineInfo, Exemplar, FeatureExtractor, FeatureVector, FeedbackCorrection, ImageLabels, ImageSource,
    MatchSource, NormalizedImage, OnnxFeatureExtractor, Preprocessor, Recommendation, SimilarityScores, TraitEngine,
    TraitEngineBuilder, TrainedTraits, TrainingReport, NOT_DETECTED,
};
pub use classifier::{
    BatchConfig, FeedbackConfig, QualityConfig, ScoringConfig, SimilarityWeights, ThresholdConfig,
};
pub use classifier::{composite_similarity, cosine_similarity, similarity};
pub use runtime::{create_session_builder, RuntimeConfig};
pub use model_manager::{ModelError, ModelManager};
pub use models::{BuiltinModel, ModelCharacteristics, ModelInfo};

pub fn init_logger() {
    env_logger::init();
}
