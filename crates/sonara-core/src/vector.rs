//! The feature vector value object.
//!
//! A [`FeatureVector`] is what an extractor produces for a single item. It is
//! never partially filled: construction rejects empty vectors and non-finite
//! components, so a vector that exists is a vector that can be indexed.
//! Absence (a failed or skipped extraction) is modelled by the caller as
//! `Option<FeatureVector>` and is never coerced into a zero vector.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An ordered, fixed-length tuple of `f32` components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Create a feature vector, validating that it is non-empty and finite.
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::invalid_data("feature vector is empty"));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::invalid_data(format!(
                "feature vector component {pos} is not finite"
            )));
        }
        Ok(Self(values))
    }

    /// Number of components.
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Borrow the components.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Consume into the underlying components.
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = Error;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::new(values)
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(vector: FeatureVector) -> Self {
        vector.0
    }
}

impl AsRef<[f32]> for FeatureVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty() {
        assert!(FeatureVector::new(vec![]).is_err());
    }

    #[test]
    fn test_rejects_non_finite() {
        let err = FeatureVector::new(vec![1.0, f32::NAN]).unwrap_err();
        assert!(err.to_string().contains("component 1"));
        assert!(FeatureVector::new(vec![f32::INFINITY]).is_err());
    }

    #[test]
    fn test_json_is_plain_array() {
        let v = FeatureVector::new(vec![0.1, 0.25, -3.5]).unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "[0.1,0.25,-3.5]");

        let back: FeatureVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.dimension(), 3);
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<FeatureVector>("[]").is_err());
    }
}
