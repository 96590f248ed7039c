use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use super::error::ClassifierError;
use super::vector::FeatureVector;

/// One labeled training sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemplar {
    pub vector: FeatureVector,
    /// Identifier of the source image, usually its file name
    pub source_id: String,
    /// Optional location the surrounding application uses to preview the sample
    pub display_url: Option<String>,
}

impl Exemplar {
    pub fn new(vector: FeatureVector, source_id: impl Into<String>) -> Self {
        Self {
            vector,
            source_id: source_id.into(),
            display_url: None,
        }
    }

    pub fn with_display_url(mut self, url: impl Into<String>) -> Self {
        self.display_url = Some(url.into());
        self
    }
}

/// Exemplars of one category, keyed by trait value.
///
/// Trait values iterate in lexicographic order, which is the order ties are
/// broken in during classification.
pub type TraitExemplars = BTreeMap<String, Vec<Exemplar>>;

/// Every category with its trait values and their exemplars.
///
/// A trait value never maps to an empty list: removing its last exemplar
/// removes the key. Categories may exist with no trait values while they wait
/// for training data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainedTraits {
    categories: BTreeMap<String, TraitExemplars>,
}

impl TrainedTraits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a category with no trait values. Returns `false` if it already existed.
    pub fn add_category(&mut self, category: &str) -> Result<bool, ClassifierError> {
        validate_name("Category", category)?;
        if self.categories.contains_key(category) {
            return Ok(false);
        }
        self.categories.insert(category.to_string(), TraitExemplars::new());
        info!("Added category '{}'", category);
        Ok(true)
    }

    /// Removes a category and drops all of its exemplars
    pub fn remove_category(&mut self, category: &str) -> Option<TraitExemplars> {
        let removed = self.categories.remove(category);
        if let Some(values) = &removed {
            info!(
                "Removed category '{}' ({} trait values)",
                category,
                values.len()
            );
        }
        removed
    }

    /// Appends an exemplar, creating the category and trait value as needed
    pub fn add_exemplar(
        &mut self,
        category: &str,
        trait_value: &str,
        exemplar: Exemplar,
    ) -> Result<usize, ClassifierError> {
        validate_name("Category", category)?;
        validate_name("Trait value", trait_value)?;
        let values = self.categories.entry(category.to_string()).or_default();
        let exemplars = values.entry(trait_value.to_string()).or_default();
        exemplars.push(exemplar);
        info!(
            "Added exemplar to '{}' / '{}' ({} total)",
            category,
            trait_value,
            exemplars.len()
        );
        Ok(exemplars.len())
    }

    /// Removes the first exemplar of a trait value with the given source id.
    ///
    /// When the removed exemplar was the last one, the trait value itself is removed.
    pub fn remove_exemplar(
        &mut self,
        category: &str,
        trait_value: &str,
        source_id: &str,
    ) -> Option<Exemplar> {
        let values = self.categories.get_mut(category)?;
        let exemplars = values.get_mut(trait_value)?;
        let pos = exemplars.iter().position(|e| e.source_id == source_id)?;
        let removed = exemplars.remove(pos);
        if exemplars.is_empty() {
            values.remove(trait_value);
            info!(
                "Removed last exemplar of '{}' / '{}'; trait value dropped",
                category, trait_value
            );
        } else {
            info!(
                "Removed exemplar '{}' from '{}' / '{}'",
                source_id, category, trait_value
            );
        }
        Some(removed)
    }

    /// Removes a trait value together with all of its exemplars
    pub fn remove_trait_value(&mut self, category: &str, trait_value: &str) -> Option<Vec<Exemplar>> {
        let removed = self.categories.get_mut(category)?.remove(trait_value);
        if let Some(exemplars) = &removed {
            info!(
                "Removed trait value '{}' / '{}' ({} exemplars)",
                category,
                trait_value,
                exemplars.len()
            );
        }
        removed
    }

    pub fn category(&self, category: &str) -> Option<&TraitExemplars> {
        self.categories.get(category)
    }

    pub fn contains_category(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = (&String, &TraitExemplars)> {
        self.categories.iter()
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// Number of exemplars in a category, or across all categories when `None`
    pub fn exemplar_count(&self, category: Option<&str>) -> usize {
        match category {
            Some(name) => self
                .categories
                .get(name)
                .map(count_exemplars)
                .unwrap_or(0),
            None => self.categories.values().map(count_exemplars).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn clear(&mut self) {
        self.categories.clear();
    }
}

fn count_exemplars(values: &TraitExemplars) -> usize {
    values.values().map(Vec::len).sum()
}

fn validate_name(kind: &str, name: &str) -> Result<(), ClassifierError> {
    if name.trim().is_empty() {
        return Err(ClassifierError::ValidationError(format!(
            "{} name cannot be empty",
            kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exemplar(source: &str) -> Exemplar {
        Exemplar::new(FeatureVector::from(vec![1.0, 0.0]), source)
    }

    #[test]
    fn test_removing_last_exemplar_drops_trait_value() {
        let mut traits = TrainedTraits::new();
        traits.add_exemplar("Background", "Red", exemplar("red1.png")).unwrap();
        traits.add_exemplar("Background", "Blue", exemplar("blue1.png")).unwrap();

        let removed = traits.remove_exemplar("Background", "Red", "red1.png");
        assert_eq!(removed.map(|e| e.source_id), Some("red1.png".to_string()));

        let values = traits.category("Background").unwrap();
        assert!(!values.contains_key("Red"));
        assert!(values.contains_key("Blue"));
    }

    #[test]
    fn test_category_may_exist_without_values() {
        let mut traits = TrainedTraits::new();
        assert!(traits.add_category("Eyes").unwrap());
        assert!(!traits.add_category("Eyes").unwrap());
        assert!(traits.category("Eyes").unwrap().is_empty());
        assert_eq!(traits.exemplar_count(Some("Eyes")), 0);
    }

    #[test]
    fn test_insertion_order_is_preserved_within_value() {
        let mut traits = TrainedTraits::new();
        for name in ["a.png", "b.png", "c.png"] {
            traits.add_exemplar("Hat", "Cap", exemplar(name)).unwrap();
        }
        let ids: Vec<_> = traits.category("Hat").unwrap()["Cap"]
            .iter()
            .map(|e| e.source_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a.png", "b.png", "c.png"]);
        assert_eq!(traits.exemplar_count(None), 3);
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let mut traits = TrainedTraits::new();
        traits.add_exemplar("Hat", "Cap", exemplar("a.png")).unwrap();
        assert!(traits.remove_exemplar("Hat", "Cap", "missing.png").is_none());
        assert!(traits.remove_exemplar("Hat", "Beanie", "a.png").is_none());
        assert!(traits.remove_exemplar("Shoes", "Cap", "a.png").is_none());
    }

    #[test]
    fn test_empty_names_rejected() {
        let mut traits = TrainedTraits::new();
        assert!(traits.add_category(" ").is_err());
        assert!(traits.add_exemplar("Hat", "", exemplar("a.png")).is_err());
    }
}
