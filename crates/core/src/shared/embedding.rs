use serde::{Deserialize, Serialize};

use crate::shared::sign_error::SignError;

/// Tolerance when checking that stored vectors are unit length.
const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// A unit-length face embedding.
///
/// Construction always normalizes, so the dot product of two embeddings is
/// their cosine similarity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// L2-normalizes `values`. Empty, non-finite or zero-norm input fails
    /// with [`SignError::ExtractionFailed`].
    pub fn normalized(mut values: Vec<f32>) -> Result<Self, SignError> {
        if values.is_empty() {
            return Err(SignError::ExtractionFailed("empty embedding".into()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SignError::ExtractionFailed(
                "embedding contains non-finite values".into(),
            ));
        }
        let norm = l2_normalize(&mut values);
        if norm <= f32::EPSILON {
            return Err(SignError::ExtractionFailed("embedding has zero norm".into()));
        }
        Ok(Self(values))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Cosine similarity, clamped to `[-1, 1]` against rounding drift.
    pub fn similarity(&self, other: &Embedding) -> f64 {
        let dot: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(x, y)| (*x as f64) * (*y as f64))
            .sum();
        dot.clamp(-1.0, 1.0)
    }

    pub fn is_unit(&self) -> bool {
        let norm: f32 = self.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        (norm - 1.0).abs() <= UNIT_NORM_TOLERANCE
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = SignError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Embedding::normalized(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0
    }
}

/// Scales `v` to unit length in place and returns the original norm.
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::normalized(values.to_vec()).unwrap()
    }

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        let norm = l2_normalize(&mut v);
        assert_relative_eq!(norm, 5.0);
        assert_relative_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(v[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        assert_eq!(l2_normalize(&mut v), 0.0);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalized_rejects_zero_norm() {
        let err = Embedding::normalized(vec![0.0, 0.0]).unwrap_err();
        assert!(matches!(err, SignError::ExtractionFailed(_)));
    }

    #[test]
    fn test_normalized_rejects_nan() {
        assert!(Embedding::normalized(vec![f32::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_normalized_rejects_empty() {
        assert!(Embedding::normalized(vec![]).is_err());
    }

    #[test]
    fn test_self_similarity_is_one() {
        let a = emb(&[0.6, 0.8]);
        assert_relative_eq!(a.similarity(&a), 1.0, epsilon = 1e-6);
        assert!(a.is_unit());
    }

    #[test]
    fn test_similarity_orthogonal() {
        assert_relative_eq!(emb(&[1.0, 0.0]).similarity(&emb(&[0.0, 1.0])), 0.0);
    }

    #[test]
    fn test_similarity_opposite() {
        assert_relative_eq!(emb(&[1.0, 0.0]).similarity(&emb(&[-1.0, 0.0])), -1.0);
    }

    #[test]
    fn test_unnormalized_input_is_scaled() {
        let a = emb(&[3.0, 4.0]);
        assert_relative_eq!(a.as_slice()[0], 0.6, epsilon = 1e-6);
        assert!(a.is_unit());
    }

    #[test]
    fn test_deserialize_normalizes_and_validates() {
        let a: Embedding = serde_json::from_str("[3.0, 4.0]").unwrap();
        assert_relative_eq!(a.as_slice()[1], 0.8, epsilon = 1e-6);
        assert!(serde_json::from_str::<Embedding>("[0.0, 0.0]").is_err());
    }

    #[test]
    fn test_serialize_as_plain_array() {
        let json = serde_json::to_string(&emb(&[1.0, 0.0])).unwrap();
        assert_eq!(json, "[1.0,0.0]");
    }
}
