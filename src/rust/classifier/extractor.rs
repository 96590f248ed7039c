use std::collections::HashMap;
use std::path::Path;

use log::{error, info};
use ndarray::{Array1, Array3, Axis};
use ort::session::Session;
use ort::value::Tensor;

use super::error::ClassifierError;
use super::preprocess::NormalizedImage;
use super::vector::FeatureVector;
use crate::runtime::{create_session_builder, RuntimeConfig};
use crate::ModelCharacteristics;

/// Turns a normalised image into a feature vector.
///
/// This is the seam to the pretrained backbone: the engine depends only on
/// the output contract (a fixed-length vector per image), so any backbone or
/// an in-process stand-in can be plugged in.
pub trait FeatureExtractor: Send + Sync {
    /// Extracts the features of one image. Failures are returned, never defaulted.
    fn extract(&self, image: &NormalizedImage) -> Result<FeatureVector, ClassifierError>;

    /// Length of every vector this extractor produces
    fn embedding_size(&self) -> usize;

    /// Square input side length the extractor expects
    fn input_size(&self) -> u32 {
        224
    }
}

/// A feature extractor backed by an ONNX image model.
///
/// The model is expected to:
/// - accept one input of shape `[1, 3, H, W]` (f32, normalised CHW)
/// - produce at least one output whose values, flattened, form the embedding
///
/// Embeddings are L2-normalised before they are returned.
#[derive(Debug)]
pub struct OnnxFeatureExtractor {
    model_path: String,
    session: Session,
    input_name: String,
    characteristics: ModelCharacteristics,
}

impl OnnxFeatureExtractor {
    /// Loads a model whose characteristics are known up front
    pub fn load(
        model_path: impl AsRef<Path>,
        characteristics: ModelCharacteristics,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(ClassifierError::ExtractorNotReady(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let session = create_session_builder(runtime_config)?
            .commit_from_file(model_path)
            .map_err(|e| {
                error!("Failed to load model {:?}: {}", model_path, e);
                ClassifierError::ModelError(format!("Failed to load model: {}", e))
            })?;

        Self::validate_model(&session)?;
        info!("Model structure validated successfully");

        let input_name = session.inputs[0].name.clone();
        Ok(Self {
            model_path: model_path.to_string_lossy().to_string(),
            session,
            input_name,
            characteristics,
        })
    }

    /// Loads a model and infers its embedding size by running a blank image
    pub fn load_custom(
        model_path: impl AsRef<Path>,
        input_size: u32,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let mut extractor = Self::load(
            model_path,
            ModelCharacteristics {
                embedding_size: 0,
                input_size,
                model_size_mb: 0,
            },
            runtime_config,
        )?;

        let side = input_size as usize;
        let blank = NormalizedImage {
            tensor: Array3::zeros((3, side, side)),
        };
        let embedding_size = extractor.run(&blank)?.len();
        if embedding_size == 0 {
            return Err(ClassifierError::ModelError("Model produced an empty embedding".into()));
        }
        info!("Inferred embedding size from model: {}", embedding_size);
        extractor.characteristics.embedding_size = embedding_size;
        Ok(extractor)
    }

    pub fn model_path(&self) -> &str {
        &self.model_path
    }

    pub fn characteristics(&self) -> &ModelCharacteristics {
        &self.characteristics
    }

    fn run(&self, image: &NormalizedImage) -> Result<FeatureVector, ClassifierError> {
        let input = image.tensor.clone().insert_axis(Axis(0));
        let tensor = Tensor::from_array(input)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to create input tensor: {}", e)))?;

        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), tensor);

        let outputs = self
            .session
            .run(input_tensors)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract output tensor: {}", e)))?;

        let embedding = Array1::from_iter(output_tensor.iter().cloned());
        Ok(FeatureVector::normalized(embedding))
    }

    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        if session.inputs.is_empty() {
            return Err(ClassifierError::ModelError(
                "Model must have an image input".to_string(),
            ));
        }
        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelError(
                "Model must have at least 1 output for embeddings".to_string(),
            ));
        }
        Ok(())
    }
}

impl FeatureExtractor for OnnxFeatureExtractor {
    fn extract(&self, image: &NormalizedImage) -> Result<FeatureVector, ClassifierError> {
        let expected = self.characteristics.input_size as usize;
        if image.width() != expected || image.height() != expected {
            return Err(ClassifierError::ValidationError(format!(
                "Image is {}x{}, model expects {}x{}",
                image.width(),
                image.height(),
                expected,
                expected
            )));
        }
        let vector = self.run(image)?;
        if self.characteristics.embedding_size != 0 && vector.len() != self.characteristics.embedding_size {
            return Err(ClassifierError::ModelError(format!(
                "Model produced {} features, expected {}",
                vector.len(),
                self.characteristics.embedding_size
            )));
        }
        Ok(vector)
    }

    fn embedding_size(&self) -> usize {
        self.characteristics.embedding_size
    }

    fn input_size(&self) -> u32 {
        self.characteristics.input_size
    }
}
