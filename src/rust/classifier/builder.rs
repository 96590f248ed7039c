use std::collections::BTreeSet;
use std::sync::Arc;

use log::info;

use super::config::EngineConfig;
use super::engine::TraitEngine;
use super::error::ClassifierError;
use super::exemplar::TrainedTraits;
use super::extractor::{FeatureExtractor, OnnxFeatureExtractor};
use super::preprocess::{AugmentOptions, Preprocessor};
use crate::{runtime::RuntimeConfig, BuiltinModel, ModelManager};

/// A builder for constructing a TraitEngine with a fluent interface.
#[derive(Default)]
pub struct TraitEngineBuilder {
    extractor: Option<Arc<dyn FeatureExtractor>>,
    config: EngineConfig,
    runtime_config: RuntimeConfig,
    preprocessor: Option<Preprocessor>,
    augment: AugmentOptions,
    categories: BTreeSet<String>,
}

impl std::fmt::Debug for TraitEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraitEngineBuilder")
            .field("has_extractor", &self.extractor.is_some())
            .field("config", &self.config)
            .field("categories", &self.categories)
            .finish()
    }
}

impl TraitEngineBuilder {
    /// Creates a new empty builder with the default configuration
    ///
    /// # Example
    /// ```
    /// use traitlens::TraitEngineBuilder;
    ///
    /// let builder = TraitEngineBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime configuration used when loading ONNX models.
    ///
    /// Must be called before `with_model` / `with_custom_model` to take effect.
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Sets the engine configuration after validating it
    ///
    /// # Example
    /// ```
    /// use traitlens::{EngineConfig, TraitEngineBuilder};
    ///
    /// let mut config = EngineConfig::default();
    /// config.feedback.capacity = 100;
    /// let builder = TraitEngineBuilder::new().with_config(config).unwrap();
    /// ```
    pub fn with_config(mut self, config: EngineConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Uses a built-in backbone from the model cache
    ///
    /// # Returns
    /// * `Result<Self, ClassifierError>` - The builder instance if successful, or an error if:
    ///   - An extractor is already set
    ///   - The model is not downloaded (`ExtractorNotReady`)
    ///   - The model failed to load or has an invalid structure
    pub fn with_model(self, model: BuiltinModel) -> Result<Self, ClassifierError> {
        self.ensure_no_extractor()?;

        let manager = ModelManager::new_default()
            .map_err(|e| ClassifierError::BuildError(format!("Failed to create model manager: {}", e)))?;
        let info = model.get_model_info();
        if !manager.is_model_downloaded(&info.name) {
            return Err(ClassifierError::ExtractorNotReady(format!(
                "Model '{:?}' is not downloaded. Please download it first using ModelManager::download_model()",
                model
            )));
        }

        let extractor = OnnxFeatureExtractor::load(
            manager.get_model_path(&info.name),
            model.characteristics(),
            &self.runtime_config,
        )?;
        info!("Loaded built-in model {:?}", model);
        self.attach(Arc::new(extractor))
    }

    /// Uses an ONNX image model from disk
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `input_size` - Square input side length, 224 when `None`
    ///
    /// The embedding size is inferred by running a blank image through the model.
    pub fn with_custom_model(self, model_path: &str, input_size: Option<u32>) -> Result<Self, ClassifierError> {
        if model_path.is_empty() {
            return Err(ClassifierError::BuildError("Model path cannot be empty".to_string()));
        }
        self.ensure_no_extractor()?;
        let extractor = OnnxFeatureExtractor::load_custom(
            model_path,
            input_size.unwrap_or(224),
            &self.runtime_config,
        )?;
        self.attach(Arc::new(extractor))
    }

    /// Uses any feature extractor implementation
    pub fn with_extractor(self, extractor: impl FeatureExtractor + 'static) -> Result<Self, ClassifierError> {
        self.ensure_no_extractor()?;
        self.attach(Arc::new(extractor))
    }

    /// Overrides image preprocessing. The size follows the extractor's input size at build time.
    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Enables ensemble embeddings over colour-jittered copies of each image
    pub fn with_augmentation(mut self, options: AugmentOptions) -> Self {
        self.augment = options;
        self
    }

    /// Declares a category up front. Duplicates are rejected.
    pub fn add_category(mut self, category: impl Into<String>) -> Result<Self, ClassifierError> {
        let category = category.into();
        if category.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Category name cannot be empty".into()));
        }
        if !self.categories.insert(category.clone()) {
            return Err(ClassifierError::ValidationError(format!(
                "Category '{}' already added",
                category
            )));
        }
        Ok(self)
    }

    /// Builds the engine.
    ///
    /// An engine without an extractor can still be trained and queried with
    /// precomputed vectors; image operations report `ExtractorNotReady`.
    pub fn build(self) -> Result<TraitEngine, ClassifierError> {
        self.config.validate()?;

        let mut preprocessor = self.preprocessor.unwrap_or_default();
        match &self.extractor {
            Some(extractor) => {
                if preprocessor.size != extractor.input_size() {
                    info!(
                        "Resizing images to {}px to match the extractor input",
                        extractor.input_size()
                    );
                    preprocessor.size = extractor.input_size();
                }
            }
            None => info!("Building engine without a feature extractor (vector input only)"),
        }

        let mut traits = TrainedTraits::new();
        for category in &self.categories {
            traits.add_category(category)?;
        }

        Ok(TraitEngine::from_parts(
            self.config,
            self.extractor,
            preprocessor,
            self.augment,
            traits,
        ))
    }

    fn ensure_no_extractor(&self) -> Result<(), ClassifierError> {
        if self.extractor.is_some() {
            return Err(ClassifierError::BuildError("Feature extractor already set".to_string()));
        }
        Ok(())
    }

    fn attach(mut self, extractor: Arc<dyn FeatureExtractor>) -> Result<Self, ClassifierError> {
        if extractor.embedding_size() == 0 {
            return Err(ClassifierError::BuildError(
                "Feature extractor reports an empty embedding".to_string(),
            ));
        }
        self.extractor = Some(extractor);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_category_rejected() {
        let result = TraitEngineBuilder::new()
            .add_category("Hat")
            .and_then(|b| b.add_category("Hat"));
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.scoring.max_weight = 2.0;
        assert!(TraitEngineBuilder::new().with_config(config).is_err());
    }

    #[test]
    fn test_build_without_extractor() {
        let engine = TraitEngineBuilder::new()
            .add_category("Hat")
            .unwrap()
            .build()
            .unwrap();
        assert!(!engine.has_extractor());
        assert_eq!(engine.categories(), vec!["Hat".to_string()]);
    }

    #[test]
    fn test_empty_custom_model_path() {
        assert!(matches!(
            TraitEngineBuilder::new().with_custom_model("", None),
            Err(ClassifierError::BuildError(_))
        ));
    }
}
