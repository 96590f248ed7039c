//! Cooperative classification of many images.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::DynamicImage;
use log::{debug, info, warn};
use serde::Serialize;

use super::engine::TraitEngine;
use super::error::ClassifierError;
use super::preprocess::Preprocessor;
use super::scoring::ClassificationResult;

/// Shared flag that stops a running batch before its next image.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a batch image comes from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Decoded(DynamicImage),
    /// Decoded on the blocking pool when its turn comes
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct BatchInput {
    pub source_id: String,
    pub source: ImageSource,
}

impl BatchInput {
    pub fn decoded(source_id: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            source_id: source_id.into(),
            source: ImageSource::Decoded(image),
        }
    }

    pub fn path(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            source: ImageSource::Path(path.into()),
        }
    }
}

/// Per-category results for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageLabels {
    pub source_id: String,
    pub labels: BTreeMap<String, ClassificationResult>,
    /// Set when the image could not be processed; every label is then "Not Detected"
    pub error: Option<String>,
}

impl ImageLabels {
    /// `(category, label, confidence)` for every detected trait
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str, f32)> + '_ {
        self.labels
            .iter()
            .filter(|(_, result)| result.is_detected())
            .map(|(category, result)| (category.as_str(), result.label.as_str(), result.confidence))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<ImageLabels>,
    /// True when the flag stopped the batch early; `results` then holds the processed prefix
    pub cancelled: bool,
}

impl TraitEngine {
    /// Classifies images one at a time against every trained category.
    ///
    /// Yields to the runtime after every `batch.batch_size` images and checks
    /// `cancel` before each image. A failing image gets "Not Detected" for
    /// every category and the batch carries on.
    pub async fn classify_batch(&self, images: Vec<BatchInput>, cancel: &CancellationFlag) -> BatchOutcome {
        let batch_size = self.config.batch.batch_size.max(1);
        let total = images.len();
        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(total),
            cancelled: false,
        };

        for (index, input) in images.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Batch cancelled after {} of {} images", index, total);
                outcome.cancelled = true;
                break;
            }

            let labels = match self.classify_input(input.source).await {
                Ok(results) => ImageLabels {
                    source_id: input.source_id,
                    labels: results.into_iter().collect(),
                    error: None,
                },
                Err(e) => {
                    warn!("Failed to classify '{}': {}", input.source_id, e);
                    ImageLabels {
                        source_id: input.source_id,
                        labels: self.undetected_labels(),
                        error: Some(e.to_string()),
                    }
                }
            };
            outcome.results.push(labels);

            if (index + 1) % batch_size == 0 {
                debug!("Processed {}/{} images, yielding", index + 1, total);
                tokio::task::yield_now().await;
            }
        }

        outcome
    }

    async fn classify_input(
        &self,
        source: ImageSource,
    ) -> Result<Vec<(String, ClassificationResult)>, ClassifierError> {
        let image = match source {
            ImageSource::Decoded(image) => image,
            ImageSource::Path(path) => tokio::task::spawn_blocking(move || Preprocessor::load(path))
                .await
                .map_err(|e| ClassifierError::ImageError(format!("Image decoding task failed: {}", e)))??,
        };
        self.classify_all(&image)
    }

    fn undetected_labels(&self) -> BTreeMap<String, ClassificationResult> {
        self.categories()
            .into_iter()
            .filter(|category| self.exemplar_count(Some(category)) > 0)
            .map(|category| (category, ClassificationResult::not_detected()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::scoring::{MatchSource, NOT_DETECTED};

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_attributes_skip_not_detected() {
        let mut labels = BTreeMap::new();
        labels.insert("Background".to_string(), ClassificationResult {
            label: "Red".to_string(),
            confidence: 0.9,
            similarity: 0.95,
            consistency_score: 0.8,
            candidate: Some("Red".to_string()),
            source: MatchSource::Exemplars,
        });
        labels.insert("Hat".to_string(), ClassificationResult::not_detected());
        let image = ImageLabels {
            source_id: "a.png".to_string(),
            labels,
            error: None,
        };

        let attributes: Vec<_> = image.attributes().collect();
        assert_eq!(attributes, vec![("Background", "Red", 0.9)]);
        assert_eq!(image.labels["Hat"].label, NOT_DETECTED);
    }
}
