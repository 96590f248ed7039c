use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use image::DynamicImage;
use log::{debug, info, warn};

use super::config::EngineConfig;
use super::error::ClassifierError;
use super::exemplar::{Exemplar, TrainedTraits};
use super::extractor::FeatureExtractor;
use super::feedback::{FeedbackCorrection, FeedbackStore};
use super::preprocess::{augment_variants, AugmentOptions, Preprocessor};
use super::quality::{analyze, TrainingReport};
use super::scoring::{classify, ClassificationResult};
use super::threshold::{CategoryStats, ThresholdManager};
use super::vector::{average_vectors, FeatureVector};
use super::EngineInfo;

/// Everything classification reads, guarded together so a reader always sees
/// exemplars, thresholds and corrections from the same moment.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) traits: TrainedTraits,
    pub(crate) thresholds: ThresholdManager,
    pub(crate) feedback: FeedbackStore,
}

impl EngineState {
    fn new(config: &EngineConfig) -> Self {
        Self {
            traits: TrainedTraits::new(),
            thresholds: ThresholdManager::new(config.threshold),
            feedback: FeedbackStore::new(config.feedback),
        }
    }

    fn recompute_threshold(&mut self, category: &str, config: &EngineConfig) -> Option<f32> {
        let values = self.traits.category(category)?;
        let feedback_count = self.feedback.count(category);
        self.thresholds
            .recompute(category, values, feedback_count, &config.similarity)
    }

    fn classify(&self, category: &str, vector: &FeatureVector, config: &EngineConfig) -> Option<ClassificationResult> {
        let values = self.traits.category(category)?;
        if values.is_empty() {
            return None;
        }
        if let Some(result) = self
            .feedback
            .check_override(vector, category, &config.similarity)
        {
            return Some(result);
        }
        classify(
            category,
            vector,
            values,
            self.thresholds.threshold(category),
            &config.similarity,
            &config.scoring,
        )
    }
}

/// The trait classification engine.
///
/// Holds the trained exemplars, per-category thresholds and the feedback
/// memory, plus the feature extractor used to turn images into vectors.
/// Engines are independent values: create as many as needed and drop them to
/// release every vector they hold.
///
/// ```
/// # fn main() -> Result<(), traitlens::ClassifierError> {
/// use traitlens::{FeatureVector, TraitEngine};
///
/// let engine = TraitEngine::builder().add_category("Background")?.build()?;
/// for i in 0..3 {
///     let v = FeatureVector::from(vec![1.0, 0.01 * i as f32, 0.0]);
///     engine.add_exemplar_vector("Background", "Red", v, &format!("red{}.png", i), None)?;
/// }
///
/// let result = engine
///     .classify_vector("Background", &FeatureVector::from(vec![1.0, 0.0, 0.0]))
///     .expect("category has exemplars");
/// assert_eq!(result.label, "Red");
/// # Ok(())
/// # }
/// ```
///
/// # Thread Safety
///
/// `TraitEngine` is `Send + Sync`; share it with `Arc`. Mutations take an
/// exclusive lock, classification takes a shared one.
pub struct TraitEngine {
    pub(crate) config: EngineConfig,
    extractor: Option<Arc<dyn FeatureExtractor>>,
    preprocessor: Preprocessor,
    augment: AugmentOptions,
    state: RwLock<EngineState>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<TraitEngine>();
    }
};

impl std::fmt::Debug for TraitEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraitEngine")
            .field("config", &self.config)
            .field("has_extractor", &self.extractor.is_some())
            .field("preprocessor", &self.preprocessor)
            .field("augment", &self.augment)
            .finish()
    }
}

impl TraitEngine {
    /// Creates a new TraitEngineBuilder for fluent construction
    pub fn builder() -> super::builder::TraitEngineBuilder {
        super::builder::TraitEngineBuilder::new()
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        extractor: Option<Arc<dyn FeatureExtractor>>,
        preprocessor: Preprocessor,
        augment: AugmentOptions,
        traits: TrainedTraits,
    ) -> Self {
        let mut state = EngineState::new(&config);
        state.traits = traits;
        Self {
            config,
            extractor,
            preprocessor,
            augment,
            state: RwLock::new(state),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    /// Returns information about the engine's current state
    pub fn info(&self) -> EngineInfo {
        let state = self.read();
        let trait_values: usize = state.traits.categories().map(|(_, values)| values.len()).sum();
        let exemplars = state.traits.exemplar_count(None);
        let corrections = state.feedback.total();
        EngineInfo {
            categories: state.traits.category_names(),
            trait_values,
            exemplars,
            corrections,
            live_vectors: exemplars + corrections,
            embedding_size: self.extractor.as_ref().map(|e| e.embedding_size()),
        }
    }

    /// Turns an image into a feature vector.
    ///
    /// With augmentation enabled the result is the normalised mean of the
    /// original's and every perturbed copy's embedding.
    pub fn embed_image(&self, image: &DynamicImage) -> Result<FeatureVector, ClassifierError> {
        let extractor = self.extractor.as_ref().ok_or_else(|| {
            ClassifierError::ExtractorNotReady("No feature extractor attached to this engine".into())
        })?;

        let base = extractor.extract(&self.preprocessor.preprocess(image)?)?;
        let variants = augment_variants(image, &self.augment);
        if variants.is_empty() {
            return Ok(base);
        }

        let mut embeddings = Vec::with_capacity(variants.len() + 1);
        embeddings.push(base);
        for variant in &variants {
            embeddings.push(extractor.extract(&self.preprocessor.preprocess(variant)?)?);
        }
        let mean = average_vectors(&embeddings).ok_or_else(|| {
            ClassifierError::ModelError("Extractor returned embeddings of different lengths".into())
        })?;
        debug!("Averaged {} embeddings into an ensemble vector", embeddings.len());
        Ok(FeatureVector::normalized(mean))
    }

    /// Registers a category with no trained values yet
    pub fn add_category(&self, category: &str) -> Result<bool, ClassifierError> {
        self.write().traits.add_category(category)
    }

    /// Removes a category together with its exemplars, threshold and corrections
    pub fn remove_category(&self, category: &str) -> bool {
        let mut state = self.write();
        let removed = state.traits.remove_category(category).is_some();
        state.thresholds.forget(category);
        state.feedback.clear_category(category);
        removed
    }

    pub fn categories(&self) -> Vec<String> {
        self.read().traits.category_names()
    }

    /// Embeds an image and stores it as an exemplar
    pub fn add_exemplar(
        &self,
        category: &str,
        trait_value: &str,
        image: &DynamicImage,
        source_id: &str,
        display_url: Option<&str>,
    ) -> Result<usize, ClassifierError> {
        let vector = self.embed_image(image)?;
        self.add_exemplar_vector(category, trait_value, vector, source_id, display_url)
    }

    /// Stores an already extracted vector as an exemplar and recomputes the
    /// category's threshold. Returns the trait value's exemplar count.
    pub fn add_exemplar_vector(
        &self,
        category: &str,
        trait_value: &str,
        vector: FeatureVector,
        source_id: &str,
        display_url: Option<&str>,
    ) -> Result<usize, ClassifierError> {
        if vector.is_empty() {
            return Err(ClassifierError::ValidationError("Feature vector cannot be empty".into()));
        }
        if let Some(extractor) = &self.extractor {
            let expected = extractor.embedding_size();
            if expected != 0 && vector.len() != expected {
                return Err(ClassifierError::ValidationError(format!(
                    "Feature vector has {} values, extractor produces {}",
                    vector.len(),
                    expected
                )));
            }
        }

        let mut exemplar = Exemplar::new(vector, source_id);
        if let Some(url) = display_url {
            exemplar = exemplar.with_display_url(url);
        }

        let mut state = self.write();
        let count = state.traits.add_exemplar(category, trait_value, exemplar)?;
        state.recompute_threshold(category, &self.config);
        Ok(count)
    }

    /// Removes an exemplar by source id and recomputes the category's threshold
    pub fn remove_exemplar(&self, category: &str, trait_value: &str, source_id: &str) -> bool {
        let mut state = self.write();
        let removed = state
            .traits
            .remove_exemplar(category, trait_value, source_id)
            .is_some();
        if removed {
            state.recompute_threshold(category, &self.config);
        }
        removed
    }

    /// Removes a trait value with all its exemplars. Returns how many were dropped.
    pub fn remove_trait_value(&self, category: &str, trait_value: &str) -> usize {
        let mut state = self.write();
        let removed = state
            .traits
            .remove_trait_value(category, trait_value)
            .map(|exemplars| exemplars.len())
            .unwrap_or(0);
        if removed > 0 {
            state.recompute_threshold(category, &self.config);
        }
        removed
    }

    pub fn exemplar_count(&self, category: Option<&str>) -> usize {
        self.read().traits.exemplar_count(category)
    }

    /// A copy of the current training data
    pub fn trained_traits(&self) -> TrainedTraits {
        self.read().traits.clone()
    }

    /// Classifies a vector against one category.
    ///
    /// Returns `None` exactly when the category has no exemplars. Stored
    /// corrections are consulted first and win over the exemplars.
    pub fn classify_vector(&self, category: &str, vector: &FeatureVector) -> Option<ClassificationResult> {
        self.read().classify(category, vector, &self.config)
    }

    /// Classifies a vector against every category that has exemplars
    pub fn classify_vector_all(&self, vector: &FeatureVector) -> Vec<(String, ClassificationResult)> {
        let state = self.read();
        state
            .traits
            .category_names()
            .into_iter()
            .filter_map(|category| {
                let result = state.classify(&category, vector, &self.config)?;
                Some((category, result))
            })
            .collect()
    }

    pub fn classify_image(
        &self,
        category: &str,
        image: &DynamicImage,
    ) -> Result<Option<ClassificationResult>, ClassifierError> {
        let vector = self.embed_image(image)?;
        Ok(self.classify_vector(category, &vector))
    }

    /// Embeds an image once and classifies it against every category
    pub fn classify_all(&self, image: &DynamicImage) -> Result<Vec<(String, ClassificationResult)>, ClassifierError> {
        let vector = self.embed_image(image)?;
        Ok(self.classify_vector_all(&vector))
    }

    /// Records a user correction for an image.
    ///
    /// The image is embedded once and the vector handed to [`Self::add_correction`].
    pub fn submit_correction(
        &self,
        image: &DynamicImage,
        category: &str,
        wrong_label: &str,
        correct_label: &str,
        source_id: &str,
    ) -> Result<(), ClassifierError> {
        let vector = self.embed_image(image)?;
        self.add_correction(&vector, wrong_label, correct_label, category, source_id)
    }

    /// Stores a correction, recomputes the category threshold with the new
    /// feedback volume and then nudges it down once.
    pub fn add_correction(
        &self,
        vector: &FeatureVector,
        wrong_label: &str,
        correct_label: &str,
        category: &str,
        source_id: &str,
    ) -> Result<(), ClassifierError> {
        let mut state = self.write();
        if !state.traits.contains_category(category) {
            return Err(ClassifierError::ValidationError(format!(
                "Unknown category '{}'",
                category
            )));
        }
        state
            .feedback
            .add_correction(vector, wrong_label, correct_label, category, source_id)?;
        state.recompute_threshold(category, &self.config);
        let threshold = state.thresholds.nudge(category);
        info!(
            "Correction for '{}' stored; threshold now {:.4}",
            category, threshold
        );
        Ok(())
    }

    pub fn corrections(&self, category: &str) -> Vec<FeedbackCorrection> {
        self.read().feedback.corrections(category)
    }

    pub fn correction_count(&self, category: &str) -> usize {
        self.read().feedback.count(category)
    }

    /// Forgets corrections of one category, or of all categories
    pub fn clear_feedback(&self, category: Option<&str>) {
        let mut state = self.write();
        let categories = match category {
            Some(name) => vec![name.to_string()],
            None => state.feedback.categories(),
        };
        for name in categories {
            state.feedback.clear_category(&name);
            state.recompute_threshold(&name, &self.config);
        }
    }

    pub fn threshold(&self, category: &str) -> f32 {
        self.read().thresholds.threshold(category)
    }

    pub fn category_stats(&self, category: &str) -> Option<CategoryStats> {
        self.read().thresholds.stats(category)
    }

    /// Quality diagnostics over the current training data
    pub fn analyze_training(&self) -> TrainingReport {
        let state = self.read();
        analyze(
            &state.traits,
            &self.config.quality,
            &self.config.scoring,
            &self.config.similarity,
        )
    }

    /// Writes the feedback memory to a JSON file
    pub fn save_feedback(&self, path: impl AsRef<Path>) -> Result<(), ClassifierError> {
        self.read().feedback.save(path)
    }

    /// Replaces the feedback memory with a saved snapshot and recomputes thresholds
    pub fn load_feedback(&self, path: impl AsRef<Path>) -> Result<usize, ClassifierError> {
        let mut state = self.write();
        let loaded = state.feedback.load(path)?;
        for category in state.traits.category_names() {
            state.recompute_threshold(&category, &self.config);
        }
        let unknown: Vec<String> = state
            .feedback
            .categories()
            .into_iter()
            .filter(|c| !state.traits.contains_category(c))
            .collect();
        if !unknown.is_empty() {
            warn!("Loaded corrections for untrained categories: {:?}", unknown);
        }
        Ok(loaded)
    }

    /// Drops all exemplars, thresholds and corrections
    pub fn reset(&self) {
        let mut state = self.write();
        state.traits.clear();
        state.thresholds.clear();
        state.feedback.clear();
        info!("Engine reset");
    }
}
