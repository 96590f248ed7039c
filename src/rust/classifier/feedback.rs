//! Bounded memory of user corrections that overrides the trained exemplars.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::config::{FeedbackConfig, SimilarityWeights};
use super::error::ClassifierError;
use super::scoring::{ClassificationResult, MatchSource};
use super::similarity::composite_similarity;
use super::vector::FeatureVector;

/// A user's statement that an image was labeled `wrong_label` but is `correct_label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackCorrection {
    /// Private copy of the corrected image's features
    pub vector: FeatureVector,
    pub wrong_label: String,
    pub correct_label: String,
    pub category: String,
    pub source_id: String,
    pub timestamp: SystemTime,
}

/// Per-category FIFO of corrections with a fixed capacity.
#[derive(Debug, Clone)]
pub struct FeedbackStore {
    config: FeedbackConfig,
    corrections: HashMap<String, VecDeque<FeedbackCorrection>>,
}

#[derive(Serialize, Deserialize)]
struct FeedbackSnapshot {
    corrections: Vec<FeedbackCorrection>,
}

impl FeedbackStore {
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            config,
            corrections: HashMap::new(),
        }
    }

    /// Stores a correction, evicting the oldest one of the category when full.
    ///
    /// The vector is cloned so the store never shares a buffer with an exemplar.
    /// Returns the evicted correction, if any.
    pub fn add_correction(
        &mut self,
        vector: &FeatureVector,
        wrong_label: &str,
        correct_label: &str,
        category: &str,
        source_id: &str,
    ) -> Result<Option<FeedbackCorrection>, ClassifierError> {
        if category.trim().is_empty() || correct_label.trim().is_empty() {
            return Err(ClassifierError::ValidationError(
                "Correction needs a category and a correct label".into(),
            ));
        }
        if vector.is_empty() {
            return Err(ClassifierError::ValidationError(
                "Correction vector cannot be empty".into(),
            ));
        }
        let correction = FeedbackCorrection {
            vector: vector.clone(),
            wrong_label: wrong_label.to_string(),
            correct_label: correct_label.to_string(),
            category: category.to_string(),
            source_id: source_id.to_string(),
            timestamp: SystemTime::now(),
        };
        let evicted = self.push(correction);
        info!(
            "Stored correction for '{}': '{}' -> '{}' ({} stored)",
            category,
            wrong_label,
            correct_label,
            self.count(category)
        );
        Ok(evicted)
    }

    fn push(&mut self, correction: FeedbackCorrection) -> Option<FeedbackCorrection> {
        let list = self
            .corrections
            .entry(correction.category.clone())
            .or_default();
        list.push_back(correction);
        if list.len() > self.config.capacity {
            let evicted = list.pop_front();
            if let Some(old) = &evicted {
                debug!(
                    "Evicted oldest correction for '{}' (source '{}')",
                    old.category, old.source_id
                );
            }
            evicted
        } else {
            None
        }
    }

    /// Looks for a stored correction close enough to the target to override it.
    ///
    /// The best-matching correction must exceed the override similarity, which is
    /// stricter than normal acceptance so only near-duplicates are overridden.
    pub fn check_override(
        &self,
        target: &FeatureVector,
        category: &str,
        weights: &SimilarityWeights,
    ) -> Option<ClassificationResult> {
        let list = self.corrections.get(category)?;
        let mut best: Option<(&FeedbackCorrection, f32)> = None;
        for correction in list {
            let sim = composite_similarity(target, &correction.vector, weights);
            if best.map(|(_, s)| sim > s).unwrap_or(true) {
                best = Some((correction, sim));
            }
        }
        let (correction, sim) = best?;
        if sim <= self.config.override_similarity {
            return None;
        }
        debug!(
            "[{}] feedback override -> '{}' (similarity {:.4})",
            category, correction.correct_label, sim
        );
        Some(ClassificationResult {
            label: correction.correct_label.clone(),
            confidence: (sim + self.config.confidence_bonus).min(self.config.confidence_cap),
            similarity: sim,
            consistency_score: 1.0,
            candidate: Some(correction.correct_label.clone()),
            source: MatchSource::Feedback,
        })
    }

    pub fn count(&self, category: &str) -> usize {
        self.corrections.get(category).map(VecDeque::len).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.corrections.values().map(VecDeque::len).sum()
    }

    /// Corrections of a category, oldest first
    pub fn corrections(&self, category: &str) -> Vec<FeedbackCorrection> {
        self.corrections
            .get(category)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<String> {
        self.corrections.keys().cloned().collect()
    }

    pub fn clear_category(&mut self, category: &str) -> usize {
        self.corrections
            .remove(category)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.corrections.clear();
    }

    /// Writes every stored correction to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ClassifierError> {
        let path = path.as_ref();
        let mut corrections: Vec<FeedbackCorrection> = self
            .corrections
            .values()
            .flat_map(|list| list.iter().cloned())
            .collect();
        corrections.sort_by_key(|c| c.timestamp);
        let json = serde_json::to_string(&FeedbackSnapshot { corrections })
            .map_err(|e| ClassifierError::PersistenceError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| ClassifierError::PersistenceError(e.to_string()))?;
            }
        }
        fs::write(path, json).map_err(|e| ClassifierError::PersistenceError(e.to_string()))?;
        info!("Saved {} corrections to {:?}", self.total(), path);
        Ok(())
    }

    /// Replaces the stored corrections with those of a JSON snapshot.
    ///
    /// Capacity still applies, so only the newest corrections per category are kept.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<usize, ClassifierError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| ClassifierError::PersistenceError(e.to_string()))?;
        let mut snapshot: FeedbackSnapshot =
            serde_json::from_str(&raw).map_err(|e| ClassifierError::PersistenceError(e.to_string()))?;
        snapshot.corrections.sort_by_key(|c| c.timestamp);
        self.corrections.clear();
        for correction in snapshot.corrections {
            self.push(correction);
        }
        info!("Loaded {} corrections from {:?}", self.total(), path);
        Ok(self.total())
    }
}
