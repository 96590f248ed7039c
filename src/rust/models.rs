/// Represents the available built-in image backbones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinModel {
    /// MobileNetV2 from the ONNX model zoo
    ///
    /// The zoo export ends in the ImageNet classifier layer, so the 1000 class
    /// logits are used as the feature vector. For penultimate-layer features,
    /// export a headless model and load it with `with_custom_model`.
    ///
    /// Characteristics:
    /// - Embedding size: 1000 (ImageNet logits)
    /// - Input: 224x224 RGB
    /// - Size: ~14MB
    /// - Fast enough to embed thousands of images on a CPU
    MobileNetV2,
}

/// Characteristics of a model including its capabilities and requirements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCharacteristics {
    /// Size of the feature vectors produced by the model
    pub embedding_size: usize,
    /// Side length of the square input image
    pub input_size: u32,
    /// Approximate size of the model in memory
    pub model_size_mb: usize,
}

/// Where to fetch a model from and how to verify it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Directory name used in the model cache
    pub name: String,
    pub model_url: String,
    /// Expected SHA-256 of the model file; unverified downloads are logged as such
    pub model_hash: Option<String>,
}

impl BuiltinModel {
    pub fn characteristics(&self) -> ModelCharacteristics {
        match self {
            Self::MobileNetV2 => ModelCharacteristics {
                embedding_size: 1000,
                input_size: 224,
                model_size_mb: 14,
            },
        }
    }

    pub fn get_model_info(&self) -> ModelInfo {
        match self {
            Self::MobileNetV2 => ModelInfo {
                name: "mobilenetv2".to_string(),
                model_url: "https://github.com/onnx/models/raw/main/validated/vision/classification/mobilenet/model/mobilenetv2-12.onnx".to_string(),
                model_hash: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_model_characteristics() {
        let model = BuiltinModel::MobileNetV2;
        assert_eq!(model.characteristics().input_size, 224);
        assert_eq!(model.get_model_info().name, "mobilenetv2");
        assert!(model.get_model_info().model_url.ends_with(".onnx"));
    }
}
