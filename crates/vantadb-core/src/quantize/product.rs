//! Product quantization.
//!
//! The vector is split into `subvectors` equal partitions; training runs
//! k-means per partition to learn a codebook, and encoding maps each
//! partition to its nearest codeword index. Training is deterministic: the
//! centroid seeding and assignment use a fixed-seed xorshift64 stream.

use crate::error::{Error, Result};
use crate::quantize::{check_sample, Quantizer, QuantizerStats};
use serde::{Deserialize, Serialize};

/// Codewords per partition. Fits comfortably in the u16 code type.
const CODEBOOK_SIZE: usize = 256;

/// k-means iteration budget per partition.
const KMEANS_ITERATIONS: usize = 20;

/// Product quantizer with one k-means codebook per partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuantizer {
    subvectors: usize,
    /// `codebooks[p][c]` is codeword `c` of partition `p`.
    codebooks: Vec<Vec<Vec<f32>>>,
    dimension: usize,
    trained: bool,
}

impl ProductQuantizer {
    /// Creates an untrained product quantizer with `subvectors` partitions.
    #[must_use]
    pub fn new(subvectors: usize) -> Self {
        Self {
            subvectors,
            codebooks: Vec::new(),
            dimension: 0,
            trained: false,
        }
    }

    /// Number of partitions.
    #[must_use]
    pub const fn subvectors(&self) -> usize {
        self.subvectors
    }

    fn check_trained(&self) -> Result<()> {
        if !self.trained {
            return Err(Error::Quantization("not trained".to_string()));
        }
        Ok(())
    }

    fn sub_dim(&self) -> usize {
        self.dimension / self.subvectors
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

fn nearest_codeword(codebook: &[Vec<f32>], sub: &[f32]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (c, codeword) in codebook.iter().enumerate() {
        let dist = squared_distance(codeword, sub);
        if dist < best_dist {
            best = c;
            best_dist = dist;
        }
    }
    best
}

/// Runs k-means over the partition's subvectors.
///
/// Centroids are seeded by sampling distinct training rows with a
/// deterministic xorshift64 stream, so repeated training over the same
/// sample yields the same codebook.
fn kmeans(subvectors: &[Vec<f32>], k: usize) -> Vec<Vec<f32>> {
    let mut state: u64 = 0x5DEE_CE66_D1A4_B5B5;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    // Seed with k distinct rows (the sample may contain duplicates; that
    // only wastes codewords, it does not break the assignment step).
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
    let mut taken = vec![false; subvectors.len()];
    while centroids.len() < k {
        #[allow(clippy::cast_possible_truncation)]
        let candidate = (next() as usize) % subvectors.len();
        if !taken[candidate] {
            taken[candidate] = true;
            centroids.push(subvectors[candidate].clone());
        }
    }

    let sub_dim = subvectors[0].len();
    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![vec![0.0f32; sub_dim]; k];
        let mut counts = vec![0usize; k];
        for sub in subvectors {
            let assigned = nearest_codeword(&centroids, sub);
            counts[assigned] += 1;
            for (s, v) in sums[assigned].iter_mut().zip(sub.iter()) {
                *s += v;
            }
        }

        let mut moved = false;
        for (c, centroid) in centroids.iter_mut().enumerate() {
            if counts[c] == 0 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let inv = 1.0 / counts[c] as f32;
            for (dst, sum) in centroid.iter_mut().zip(sums[c].iter()) {
                let updated = sum * inv;
                if (updated - *dst).abs() > 1e-7 {
                    moved = true;
                }
                *dst = updated;
            }
        }
        if !moved {
            break;
        }
    }
    centroids
}

impl Quantizer for ProductQuantizer {
    fn train(&mut self, samples: &[Vec<f32>]) -> Result<()> {
        if self.subvectors == 0 {
            return Err(Error::Quantization("subvectors must be positive".to_string()));
        }
        let dimension = check_sample(samples)?;
        if dimension % self.subvectors != 0 {
            return Err(Error::Quantization(format!(
                "subvectors {} must divide dimension {dimension}",
                self.subvectors
            )));
        }

        let sub_dim = dimension / self.subvectors;
        let k = CODEBOOK_SIZE.min(samples.len());
        let mut codebooks = Vec::with_capacity(self.subvectors);
        for p in 0..self.subvectors {
            let start = p * sub_dim;
            let rows: Vec<Vec<f32>> = samples
                .iter()
                .map(|s| s[start..start + sub_dim].to_vec())
                .collect();
            codebooks.push(kmeans(&rows, k));
        }

        self.codebooks = codebooks;
        self.dimension = dimension;
        self.trained = true;
        Ok(())
    }

    fn encode(&self, vector: &[f32]) -> Result<Vec<u16>> {
        self.check_trained()?;
        if vector.len() != self.dimension {
            return Err(Error::Quantization(format!(
                "dimension mismatch with codebook: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        let sub_dim = self.sub_dim();
        let mut code = Vec::with_capacity(self.subvectors);
        for (p, codebook) in self.codebooks.iter().enumerate() {
            let start = p * sub_dim;
            let nearest = nearest_codeword(codebook, &vector[start..start + sub_dim]);
            #[allow(clippy::cast_possible_truncation)]
            code.push(nearest as u16);
        }
        Ok(code)
    }

    fn decode(&self, code: &[u16]) -> Result<Vec<f32>> {
        self.check_trained()?;
        if code.len() != self.subvectors {
            return Err(Error::Quantization(format!(
                "code length mismatch: expected {}, got {}",
                self.subvectors,
                code.len()
            )));
        }

        let mut vector = Vec::with_capacity(self.dimension);
        for (p, index) in code.iter().enumerate() {
            let codebook = &self.codebooks[p];
            let codeword = codebook.get(*index as usize).ok_or_else(|| {
                Error::Quantization(format!(
                    "codeword index {index} out of range for partition {p}"
                ))
            })?;
            vector.extend_from_slice(codeword);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> Option<usize> {
        self.trained.then_some(self.dimension)
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn stats(&self) -> QuantizerStats {
        QuantizerStats {
            quantizer_type: "ProductQuantizer".to_string(),
            trained: self.trained,
            dimensions: self.dimensions(),
            bits: None,
            subvectors: Some(self.subvectors),
            compression_ratio: self.trained.then(|| {
                #[allow(clippy::cast_precision_loss)]
                let raw = (self.dimension * 4) as f32;
                #[allow(clippy::cast_precision_loss)]
                let coded = (self.subvectors * 2) as f32;
                raw / coded
            }),
        }
    }

    fn close(&mut self) {
        self.codebooks.clear();
        self.dimension = 0;
        self.trained = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_samples() -> Vec<Vec<f32>> {
        // Two well-separated clusters per partition.
        let mut samples = Vec::new();
        for i in 0..32 {
            #[allow(clippy::cast_precision_loss)]
            let jitter = (i % 4) as f32 * 0.01;
            samples.push(vec![0.0 + jitter, 0.0, 10.0 + jitter, 10.0]);
            samples.push(vec![5.0 + jitter, 5.0, -10.0 + jitter, -10.0]);
        }
        samples
    }

    #[test]
    fn test_encode_before_train_fails() {
        let q = ProductQuantizer::new(2);
        assert!(q.encode(&[1.0, 2.0, 3.0, 4.0]).is_err());
    }

    #[test]
    fn test_subvectors_must_divide_dimension() {
        let mut q = ProductQuantizer::new(3);
        let err = q.train(&clustered_samples()).unwrap_err();
        assert!(err.to_string().contains("divide"));
    }

    #[test]
    fn test_round_trip_stays_near_cluster() {
        let samples = clustered_samples();
        let mut q = ProductQuantizer::new(2);
        q.train(&samples).unwrap();
        assert_eq!(q.dimensions(), Some(4));

        for sample in &samples {
            let code = q.encode(sample).unwrap();
            assert_eq!(code.len(), 2);
            let decoded = q.decode(&code).unwrap();
            assert_eq!(decoded.len(), 4);
            // Reconstruction lands within the source cluster's spread.
            assert!(squared_distance(sample, &decoded) < 1.0);
        }
    }

    #[test]
    fn test_training_is_deterministic() {
        let samples = clustered_samples();
        let mut a = ProductQuantizer::new(2);
        let mut b = ProductQuantizer::new(2);
        a.train(&samples).unwrap();
        b.train(&samples).unwrap();
        assert_eq!(a.encode(&samples[0]).unwrap(), b.encode(&samples[0]).unwrap());
    }

    #[test]
    fn test_decode_rejects_bad_code() {
        let mut q = ProductQuantizer::new(2);
        q.train(&clustered_samples()).unwrap();
        assert!(q.decode(&[0]).is_err());
        assert!(q.decode(&[u16::MAX, 0]).is_err());
    }
}
