use ort::Error as OrtError;

/// Represents the different types of errors that can occur in the trait engine.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// No feature extractor is attached or the backbone model is not available
    #[error("Extractor not ready: {0}")]
    ExtractorNotReady(String),
    /// Error occurred while loading or running the ONNX model
    #[error("Model error: {0}")]
    ModelError(String),
    /// Error occurred while decoding or preprocessing an image
    #[error("Image error: {0}")]
    ImageError(String),
    /// Error occurred during the build phase
    #[error("Build error: {0}")]
    BuildError(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Error occurred while saving or loading a feedback snapshot
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::BuildError(err.to_string())
    }
}

impl From<image::ImageError> for ClassifierError {
    fn from(err: image::ImageError) -> Self {
        ClassifierError::ImageError(err.to_string())
    }
}
