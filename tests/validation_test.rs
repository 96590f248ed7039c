use image::{DynamicImage, RgbImage};
use traitlens::{
    BuiltinModel, ClassifierError, EngineConfig, FeatureExtractor, FeatureVector, NormalizedImage, TraitEngine,
    TraitEngineBuilder,
};

struct FixedExtractor(usize);

impl FeatureExtractor for FixedExtractor {
    fn extract(&self, _image: &NormalizedImage) -> Result<FeatureVector, ClassifierError> {
        Ok(FeatureVector::from(vec![1.0; self.0]))
    }

    fn embedding_size(&self) -> usize {
        self.0
    }
}

#[test]
fn test_duplicate_category() {
    let result = TraitEngine::builder()
        .add_category("Background")
        .and_then(|builder| builder.add_category("Background"));

    assert!(result.is_err());
    assert!(matches!(result.unwrap_err(), ClassifierError::ValidationError(_)));
}

#[test]
fn test_empty_names_rejected() -> Result<(), ClassifierError> {
    assert!(matches!(
        TraitEngine::builder().add_category("  "),
        Err(ClassifierError::ValidationError(_))
    ));

    let engine = TraitEngine::builder().add_category("Hat")?.build()?;
    let err = engine
        .add_exemplar_vector("Hat", "", FeatureVector::from(vec![1.0]), "a.png", None)
        .unwrap_err();
    assert!(matches!(err, ClassifierError::ValidationError(_)));

    let err = engine
        .add_exemplar_vector("Hat", "Cap", FeatureVector::from(Vec::<f32>::new()), "a.png", None)
        .unwrap_err();
    assert!(matches!(err, ClassifierError::ValidationError(_)));
    Ok(())
}

#[test]
fn test_image_operations_need_an_extractor() -> Result<(), ClassifierError> {
    let engine = TraitEngine::builder().add_category("Hat")?.build()?;
    let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));

    assert!(matches!(
        engine.embed_image(&image),
        Err(ClassifierError::ExtractorNotReady(_))
    ));
    assert!(matches!(
        engine.add_exemplar("Hat", "Cap", &image, "cap.png", None),
        Err(ClassifierError::ExtractorNotReady(_))
    ));
    assert!(matches!(
        engine.submit_correction(&image, "Hat", "Cap", "Beanie", "b.png"),
        Err(ClassifierError::ExtractorNotReady(_))
    ));
    Ok(())
}

#[test]
fn test_extractor_set_twice() {
    let result = TraitEngineBuilder::new()
        .with_extractor(FixedExtractor(4))
        .and_then(|builder| builder.with_extractor(FixedExtractor(4)));
    assert!(matches!(result, Err(ClassifierError::BuildError(_))));
}

#[test]
fn test_empty_embedding_rejected() {
    let result = TraitEngineBuilder::new().with_extractor(FixedExtractor(0));
    assert!(matches!(result, Err(ClassifierError::BuildError(_))));
}

#[test]
fn test_missing_custom_model() {
    let result = TraitEngineBuilder::new().with_custom_model("/nonexistent/traitlens/model.onnx", None);
    assert!(matches!(result, Err(ClassifierError::ExtractorNotReady(_))));
}

#[test]
fn test_builtin_model_not_downloaded() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("TRAITLENS_CACHE", dir.path());

    let result = TraitEngineBuilder::new().with_model(BuiltinModel::MobileNetV2);
    assert!(matches!(result, Err(ClassifierError::ExtractorNotReady(_))));
}

#[test]
fn test_config_validation() {
    let mut config = EngineConfig::default();
    config.similarity.cosine = 0.9;
    assert!(matches!(
        TraitEngineBuilder::new().with_config(config),
        Err(ClassifierError::ValidationError(_))
    ));

    let mut config = EngineConfig::default();
    config.threshold.floor = 0.9;
    assert!(config.validate().is_err());

    let mut config = EngineConfig::default();
    config.feedback.capacity = 0;
    assert!(config.validate().is_err());

    assert!(EngineConfig::default().validate().is_ok());
}

#[test]
fn test_config_from_json_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("engine.json");
    std::fs::write(&path, r#"{ "scoring": { "consistency_amplification": 1.5 }, "batch": { "batch_size": 8 } }"#)?;

    let config = EngineConfig::from_json_file(&path)?;
    assert_eq!(config.scoring.consistency_amplification, 1.5);
    assert_eq!(config.batch.batch_size, 8);
    assert_eq!(config.threshold, EngineConfig::default().threshold);

    let engine = TraitEngine::builder().with_config(config)?.build()?;
    assert_eq!(engine.config().batch.batch_size, 8);

    std::fs::write(&path, "not json")?;
    assert!(EngineConfig::from_json_file(&path).is_err());
    Ok(())
}

#[test]
fn test_correction_for_unknown_category() -> Result<(), ClassifierError> {
    let engine = TraitEngine::builder().add_category("Hat")?.build()?;
    let err = engine
        .add_correction(&FeatureVector::from(vec![1.0, 0.0]), "Cap", "Beanie", "Shoes", "x.png")
        .unwrap_err();
    assert!(matches!(err, ClassifierError::ValidationError(_)));
    assert_eq!(engine.correction_count("Shoes"), 0);
    Ok(())
}

#[test]
fn test_many_categories() -> Result<(), ClassifierError> {
    let mut builder = TraitEngine::builder();
    for i in 0..10 {
        builder = builder.add_category(format!("category_{}", i))?;
    }
    let engine = builder.build()?;
    assert_eq!(engine.categories().len(), 10);
    assert!(engine.categories().iter().all(|c| c.starts_with("category_")));

    assert!(engine.remove_category("category_3"));
    assert!(!engine.remove_category("category_3"));
    assert_eq!(engine.categories().len(), 9);
    Ok(())
}
