//! Distance metrics and vector kernels.
//!
//! All kernels validate their inputs: mismatched lengths and empty vectors
//! fail with `InvalidInput` rather than panicking. Similarity metrics
//! (cosine, jaccard, dot product) are converted to complementary distances
//! by [`DistanceMetric::distance`] so that "smaller is closer" holds
//! uniformly inside the indexes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Distance metric for vector similarity calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity. Best for normalized text embeddings.
    Cosine,
    /// Euclidean distance (L2 norm). Best when magnitude matters.
    Euclidean,
    /// Dot product (inner product). Best for MIPS over normalized vectors.
    DotProduct,
    /// Manhattan distance (L1 norm).
    Manhattan,
    /// Chebyshev distance (L-infinity norm).
    Chebyshev,
    /// Hamming distance over binarized coordinates (`> 0` maps to 1).
    Hamming,
    /// Jaccard similarity over binarized coordinates.
    Jaccard,
}

impl DistanceMetric {
    /// Parses a metric name as it appears in configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for unknown names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "cosine" => Ok(Self::Cosine),
            "euclidean" => Ok(Self::Euclidean),
            "dot_product" => Ok(Self::DotProduct),
            "manhattan" => Ok(Self::Manhattan),
            "chebyshev" => Ok(Self::Chebyshev),
            "hamming" => Ok(Self::Hamming),
            "jaccard" => Ok(Self::Jaccard),
            other => Err(Error::Config(format!("unknown metric '{other}'"))),
        }
    }

    /// Returns the configuration name of this metric.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dot_product",
            Self::Manhattan => "manhattan",
            Self::Chebyshev => "chebyshev",
            Self::Hamming => "hamming",
            Self::Jaccard => "jaccard",
        }
    }

    /// Returns whether higher raw scores indicate more similarity.
    #[must_use]
    pub const fn higher_is_better(&self) -> bool {
        matches!(self, Self::Cosine | Self::DotProduct | Self::Jaccard)
    }

    /// Computes the raw metric value (similarity for similarity metrics,
    /// distance for distance metrics).
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for empty vectors or mismatched lengths.
    pub fn score(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Euclidean => euclidean_distance(a, b),
            Self::DotProduct => dot_product(a, b),
            Self::Manhattan => manhattan_distance(a, b),
            Self::Chebyshev => chebyshev_distance(a, b),
            Self::Hamming => hamming_distance(a, b),
            Self::Jaccard => jaccard_similarity(a, b),
        }
    }

    /// Computes the distance between two vectors with "smaller is closer"
    /// semantics, converting similarity metrics to their complement.
    ///
    /// Cosine distance is clamped to `[0, 2]`; dot product is negated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for empty vectors or mismatched lengths.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        match self {
            Self::Cosine => cosine_distance(a, b),
            Self::Euclidean => euclidean_distance(a, b),
            Self::DotProduct => Ok(-dot_product(a, b)?),
            Self::Manhattan => manhattan_distance(a, b),
            Self::Chebyshev => chebyshev_distance(a, b),
            Self::Hamming => hamming_distance(a, b),
            Self::Jaccard => Ok(1.0 - jaccard_similarity(a, b)?),
        }
    }

    /// Distance for graph-internal use, where both sides come from the node
    /// table and already share the index dimension. A validation failure is
    /// mapped to infinity, pushing the pair to the end of any candidate
    /// ordering.
    pub(crate) fn distance_infallible(&self, a: &[f32], b: &[f32]) -> f32 {
        self.distance(a, b).unwrap_or(f32::INFINITY)
    }
}

/// Vector norms available for [`normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    /// Sum of absolute values.
    L1,
    /// Euclidean norm.
    L2,
    /// Maximum absolute value.
    Max,
}

fn check_pair(a: &[f32], b: &[f32]) -> Result<()> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::InvalidInput("empty vector".to_string()));
    }
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0 when either input has zero L2 norm; otherwise the result is
/// clamped to `[-1, 1]` to absorb rounding error.
///
/// # Errors
///
/// Returns `InvalidInput` for empty vectors or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_pair(a, b)?;

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Computes cosine distance (`1 - similarity`), clamped to `[0, 2]`.
///
/// # Errors
///
/// Returns `InvalidInput` for empty vectors or mismatched lengths.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    Ok((1.0 - cosine_similarity(a, b)?).clamp(0.0, 2.0))
}

/// Computes cosine similarity of one query against many vectors.
///
/// Precomputes the query norm once; zero norms are replaced by 1 only in the
/// denominator, preserving the convention of returning 0 for zero input.
///
/// # Errors
///
/// Returns `InvalidInput` if the query is empty or any vector length differs.
pub fn batch_cosine_similarity(query: &[f32], vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    if query.is_empty() {
        return Err(Error::InvalidInput("empty vector".to_string()));
    }
    let query_norm_sq: f32 = query.iter().map(|x| x * x).sum();
    let query_zero = query_norm_sq == 0.0;
    let query_norm = if query_zero { 1.0 } else { query_norm_sq.sqrt() };

    let mut out = Vec::with_capacity(vectors.len());
    for v in vectors {
        check_pair(query, v)?;
        let mut dot = 0.0f32;
        let mut norm_sq = 0.0f32;
        for (x, y) in query.iter().zip(v.iter()) {
            dot += x * y;
            norm_sq += y * y;
        }
        if query_zero || norm_sq == 0.0 {
            out.push(0.0);
        } else {
            out.push((dot / (query_norm * norm_sq.sqrt())).clamp(-1.0, 1.0));
        }
    }
    Ok(out)
}

/// Computes Euclidean (L2) distance.
///
/// # Errors
///
/// Returns `InvalidInput` for empty vectors or mismatched lengths.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    Ok(squared_euclidean_distance(a, b)?.sqrt())
}

/// Computes squared Euclidean distance (no square root).
///
/// # Errors
///
/// Returns `InvalidInput` for empty vectors or mismatched lengths.
pub fn squared_euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    check_pair(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum())
}

/// Computes Manhattan (L1) distance.
///
/// # Errors
///
/// Returns `InvalidInput` for empty vectors or mismatched lengths.
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    check_pair(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum())
}

/// Computes Chebyshev (L-infinity) distance.
///
/// # Errors
///
/// Returns `InvalidInput` for empty vectors or mismatched lengths.
pub fn chebyshev_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    check_pair(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max))
}

/// Computes the dot product (inner product).
///
/// # Errors
///
/// Returns `InvalidInput` for empty vectors or mismatched lengths.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    check_pair(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Computes Hamming distance over binarized coordinates (`> 0` maps to 1).
///
/// # Errors
///
/// Returns `InvalidInput` for empty vectors or mismatched lengths.
pub fn hamming_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    check_pair(a, b)?;
    let differing = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| (**x > 0.0) != (**y > 0.0))
        .count();
    #[allow(clippy::cast_precision_loss)]
    Ok(differing as f32)
}

/// Computes Jaccard similarity over binarized coordinates (`> 0` maps to 1).
///
/// Two all-zero vectors are identical, hence similarity 1.
///
/// # Errors
///
/// Returns `InvalidInput` for empty vectors or mismatched lengths.
pub fn jaccard_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_pair(a, b)?;
    let mut intersection = 0usize;
    let mut union = 0usize;
    for (x, y) in a.iter().zip(b.iter()) {
        let xa = *x > 0.0;
        let ya = *y > 0.0;
        if xa && ya {
            intersection += 1;
        }
        if xa || ya {
            union += 1;
        }
    }
    if union == 0 {
        return Ok(1.0);
    }
    #[allow(clippy::cast_precision_loss)]
    Ok(intersection as f32 / union as f32)
}

/// Normalizes a vector by the given norm. A zero vector is returned unchanged.
#[must_use]
pub fn normalize(v: &[f32], norm: Norm) -> Vec<f32> {
    let magnitude = match norm {
        Norm::L1 => v.iter().map(|x| x.abs()).sum(),
        Norm::L2 => v.iter().map(|x| x * x).sum::<f32>().sqrt(),
        Norm::Max => v.iter().map(|x| x.abs()).fold(0.0, f32::max),
    };
    if magnitude == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / magnitude).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cosine_similarity_basic() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm_returns_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let a = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &a).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&a, &zero).unwrap(), 0.0);
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            euclidean_distance(&a, &b),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_vector_fails() {
        let empty: Vec<f32> = Vec::new();
        let a = vec![1.0];
        assert!(matches!(
            cosine_similarity(&empty, &a),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_euclidean_distance() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![3.0, 4.0, 0.0];
        assert!((euclidean_distance(&a, &b).unwrap() - 5.0).abs() < 1e-6);
        assert!((squared_euclidean_distance(&a, &b).unwrap() - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_manhattan_and_chebyshev() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 0.0, 3.0];
        assert!((manhattan_distance(&a, &b).unwrap() - 5.0).abs() < 1e-6);
        assert!((chebyshev_distance(&a, &b).unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_hamming_and_jaccard_binarized() {
        let a = vec![1.0, 0.0, 2.0, 0.0];
        let b = vec![0.5, 0.0, 0.0, 3.0];
        // binarized: a = 1010, b = 1001
        assert!((hamming_distance(&a, &b).unwrap() - 2.0).abs() < 1e-6);
        assert!((jaccard_similarity(&a, &b).unwrap() - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_jaccard_all_zero_is_identical() {
        let zero = vec![0.0, 0.0];
        assert_eq!(jaccard_similarity(&zero, &zero).unwrap(), 1.0);
        assert_eq!(
            DistanceMetric::Jaccard.distance(&zero, &zero).unwrap(),
            0.0
        );
    }

    #[test]
    fn test_batch_cosine_matches_scalar() {
        let query = vec![1.0, 2.0, 3.0];
        let vectors = vec![
            vec![1.0, 2.0, 3.0],
            vec![-1.0, -2.0, -3.0],
            vec![0.0, 0.0, 0.0],
        ];
        let batch = batch_cosine_similarity(&query, &vectors).unwrap();
        for (v, got) in vectors.iter().zip(&batch) {
            let expected = cosine_similarity(&query, v).unwrap();
            assert!((got - expected).abs() < 1e-6);
        }
        assert_eq!(batch[2], 0.0);
    }

    #[test]
    fn test_metric_distance_is_smaller_closer() {
        let a = vec![1.0, 0.0];
        let near = vec![0.9, 0.1];
        let far = vec![-1.0, 0.0];
        for metric in [
            DistanceMetric::Cosine,
            DistanceMetric::Euclidean,
            DistanceMetric::DotProduct,
        ] {
            let d_near = metric.distance(&a, &near).unwrap();
            let d_far = metric.distance(&a, &far).unwrap();
            assert!(d_near < d_far, "{metric:?}: {d_near} >= {d_far}");
        }
    }

    #[test]
    fn test_metric_names_round_trip() {
        for metric in [
            DistanceMetric::Cosine,
            DistanceMetric::Euclidean,
            DistanceMetric::DotProduct,
            DistanceMetric::Manhattan,
            DistanceMetric::Chebyshev,
            DistanceMetric::Hamming,
            DistanceMetric::Jaccard,
        ] {
            assert_eq!(DistanceMetric::from_name(metric.name()).unwrap(), metric);
        }
        assert!(DistanceMetric::from_name("minkowski").is_err());
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let zero = vec![0.0, 0.0, 0.0];
        assert_eq!(normalize(&zero, Norm::L2), zero);
    }

    proptest! {
        #[test]
        fn prop_euclidean_is_a_metric(
            a in prop::collection::vec(-100.0f32..100.0, 8),
            b in prop::collection::vec(-100.0f32..100.0, 8),
            c in prop::collection::vec(-100.0f32..100.0, 8),
        ) {
            let dab = euclidean_distance(&a, &b).unwrap();
            let dba = euclidean_distance(&b, &a).unwrap();
            let daa = euclidean_distance(&a, &a).unwrap();
            let dac = euclidean_distance(&a, &c).unwrap();
            let dcb = euclidean_distance(&c, &b).unwrap();

            // Identity, symmetry, triangle inequality (with float slack).
            prop_assert!(daa.abs() < 1e-3);
            prop_assert!((dab - dba).abs() < 1e-3);
            prop_assert!(dab <= dac + dcb + 1e-3);
        }

        #[test]
        fn prop_cosine_distance_symmetric_and_bounded(
            a in prop::collection::vec(-100.0f32..100.0, 8),
            b in prop::collection::vec(-100.0f32..100.0, 8),
        ) {
            let dab = cosine_distance(&a, &b).unwrap();
            let dba = cosine_distance(&b, &a).unwrap();
            prop_assert!((dab - dba).abs() < 1e-6);
            prop_assert!((0.0..=2.0).contains(&dab));
        }

        #[test]
        fn prop_l2_normalization_has_unit_norm(
            v in prop::collection::vec(-100.0f32..100.0, 1..32)
                .prop_filter("non-zero", |v| v.iter().any(|x| *x != 0.0)),
        ) {
            let n = normalize(&v, Norm::L2);
            let norm: f32 = n.iter().map(|x| x * x).sum::<f32>().sqrt();
            prop_assert!((f64::from(norm) - 1.0).abs() < 1e-6);
        }
    }
}
