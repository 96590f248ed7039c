use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// An image's learned features as produced by the feature extractor.
///
/// The vector is immutable once built. Whoever holds a `FeatureVector` owns its
/// buffer outright: stores that need to keep a vector another store also holds
/// take their own copy with [`Clone`], and the buffer is released as soon as the
/// owning exemplar, correction or local binding is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Array1<f32>);

impl FeatureVector {
    pub fn new(values: Array1<f32>) -> Self {
        Self(values)
    }

    /// Builds an L2-normalised vector
    pub fn normalized(values: Array1<f32>) -> Self {
        Self(normalize_vector(&values))
    }

    pub fn as_array(&self) -> &Array1<f32> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.0.iter().map(|&x| x * x).sum::<f32>().sqrt()
    }

    pub fn into_inner(self) -> Array1<f32> {
        self.0
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(Array1::from_vec(values))
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(vector: FeatureVector) -> Self {
        vector.0.to_vec()
    }
}

impl From<Array1<f32>> for FeatureVector {
    fn from(values: Array1<f32>) -> Self {
        Self(values)
    }
}

pub(crate) fn normalize_vector(vec: &Array1<f32>) -> Array1<f32> {
    let norm: f32 = vec.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        vec / norm
    } else {
        Array1::zeros(vec.len())
    }
}

/// Element-wise mean of equally sized vectors, or `None` if the set is empty or ragged.
pub(crate) fn average_vectors(vectors: &[FeatureVector]) -> Option<Array1<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let sum = vectors
        .iter()
        .fold(Array1::<f32>::zeros(dim), |acc, v| acc + v.as_array());
    Some(sum / vectors.len() as f32)
}

/// Mean and population variance of a set of scores
pub(crate) fn mean_and_variance(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_has_unit_norm() {
        let v = FeatureVector::normalized(Array1::from_vec(vec![3.0, 4.0]));
        assert!((v.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_stays_zero() {
        let v = FeatureVector::normalized(Array1::zeros(4));
        assert_eq!(v.norm(), 0.0);
        assert_eq!(v.len(), 4);
    }

    #[test]
    fn test_average_rejects_ragged_input() {
        let a = FeatureVector::from(vec![1.0, 0.0]);
        let b = FeatureVector::from(vec![1.0, 0.0, 0.0]);
        assert!(average_vectors(&[a, b]).is_none());
        assert!(average_vectors(&[]).is_none());
    }

    #[test]
    fn test_average_is_elementwise_mean() {
        let a = FeatureVector::from(vec![1.0, 0.0]);
        let b = FeatureVector::from(vec![0.0, 1.0]);
        let avg = average_vectors(&[a, b]).unwrap();
        assert_eq!(avg.to_vec(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_mean_and_variance() {
        let (mean, variance) = mean_and_variance(&[1.0, 3.0]);
        assert!((mean - 2.0).abs() < 1e-6);
        assert!((variance - 1.0).abs() < 1e-6);
        assert_eq!(mean_and_variance(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let v = FeatureVector::from(vec![0.5, -1.0]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "[0.5,-1.0]");
        let back: FeatureVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
