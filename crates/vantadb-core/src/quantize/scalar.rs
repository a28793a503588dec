//! Per-dimension scalar quantization.
//!
//! Training learns a min/max per dimension from the sample; encoding maps
//! each coordinate linearly into `[0, 2^bits - 1]` and decoding applies the
//! inverse map. Out-of-range query values are clamped to the trained range.

use crate::error::{Error, Result};
use crate::quantize::{check_sample, Quantizer, QuantizerStats};
use serde::{Deserialize, Serialize};

/// Per-dimension uniform scalar quantizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarQuantizer {
    bits: u8,
    /// Minimum value per dimension.
    min_vals: Vec<f32>,
    /// Quantization step per dimension: `(max - min) / levels`, 0 for a
    /// constant dimension.
    steps: Vec<f32>,
    trained: bool,
}

impl ScalarQuantizer {
    /// Creates an untrained scalar quantizer with `bits` per dimension.
    #[must_use]
    pub fn new(bits: u8) -> Self {
        Self {
            bits,
            min_vals: Vec::new(),
            steps: Vec::new(),
            trained: false,
        }
    }

    /// Bits per dimension.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    fn levels(&self) -> u32 {
        (1u32 << u32::from(self.bits)) - 1
    }

    fn check_trained(&self) -> Result<()> {
        if !self.trained {
            return Err(Error::Quantization("not trained".to_string()));
        }
        Ok(())
    }
}

impl Quantizer for ScalarQuantizer {
    fn train(&mut self, samples: &[Vec<f32>]) -> Result<()> {
        if !(1..=16).contains(&self.bits) {
            return Err(Error::Quantization(format!(
                "bits {} is out of range [1, 16]",
                self.bits
            )));
        }
        let dimension = check_sample(samples)?;

        let mut min_vals = vec![f32::INFINITY; dimension];
        let mut max_vals = vec![f32::NEG_INFINITY; dimension];
        for sample in samples {
            for (d, value) in sample.iter().enumerate() {
                min_vals[d] = min_vals[d].min(*value);
                max_vals[d] = max_vals[d].max(*value);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let levels = self.levels() as f32;
        self.steps = min_vals
            .iter()
            .zip(max_vals.iter())
            .map(|(min, max)| {
                let range = max - min;
                if range > 0.0 {
                    range / levels
                } else {
                    0.0
                }
            })
            .collect();
        self.min_vals = min_vals;
        self.trained = true;
        Ok(())
    }

    fn encode(&self, vector: &[f32]) -> Result<Vec<u16>> {
        self.check_trained()?;
        if vector.len() != self.min_vals.len() {
            return Err(Error::Quantization(format!(
                "dimension mismatch with codebook: expected {}, got {}",
                self.min_vals.len(),
                vector.len()
            )));
        }

        let levels = self.levels();
        let mut code = Vec::with_capacity(vector.len());
        for (d, value) in vector.iter().enumerate() {
            let step = self.steps[d];
            let q = if step > 0.0 {
                #[allow(clippy::cast_precision_loss)]
                let scaled = ((value - self.min_vals[d]) / step).round();
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let clamped = scaled.clamp(0.0, levels as f32) as u32;
                clamped
            } else {
                0
            };
            #[allow(clippy::cast_possible_truncation)]
            code.push(q as u16);
        }
        Ok(code)
    }

    fn decode(&self, code: &[u16]) -> Result<Vec<f32>> {
        self.check_trained()?;
        if code.len() != self.min_vals.len() {
            return Err(Error::Quantization(format!(
                "code length mismatch: expected {}, got {}",
                self.min_vals.len(),
                code.len()
            )));
        }
        Ok(code
            .iter()
            .enumerate()
            .map(|(d, q)| self.min_vals[d] + f32::from(*q) * self.steps[d])
            .collect())
    }

    fn dimensions(&self) -> Option<usize> {
        self.trained.then(|| self.min_vals.len())
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn stats(&self) -> QuantizerStats {
        QuantizerStats {
            quantizer_type: "ScalarQuantizer".to_string(),
            trained: self.trained,
            dimensions: self.dimensions(),
            bits: Some(self.bits),
            subvectors: None,
            compression_ratio: self
                .trained
                .then(|| 32.0 / f32::from(self.bits)),
        }
    }

    fn close(&mut self) {
        self.min_vals.clear();
        self.steps.clear();
        self.trained = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_before_train_fails() {
        let q = ScalarQuantizer::new(8);
        let err = q.encode(&[1.0, 2.0]).unwrap_err();
        assert!(err.to_string().contains("not trained"));
    }

    #[test]
    fn test_round_trip_error_is_bounded() {
        let samples: Vec<Vec<f32>> = (0..64)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let base = i as f32 / 64.0;
                vec![base, -base, base * 10.0, 7.5]
            })
            .collect();

        let mut q = ScalarQuantizer::new(8);
        q.train(&samples).unwrap();
        assert_eq!(q.dimensions(), Some(4));

        for sample in &samples {
            let decoded = q.decode(&q.encode(sample).unwrap()).unwrap();
            for (d, (a, b)) in sample.iter().zip(decoded.iter()).enumerate() {
                // One quantization step of slack per dimension.
                let range = match d {
                    0 | 1 => 1.0,
                    2 => 10.0,
                    _ => 0.0,
                };
                let tolerance = range / 255.0 + 1e-6;
                assert!((a - b).abs() <= tolerance, "dim {d}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_constant_dimension_decodes_exactly() {
        let mut q = ScalarQuantizer::new(4);
        q.train(&[vec![3.0, 1.0], vec![3.0, 2.0]]).unwrap();
        let decoded = q.decode(&q.encode(&[3.0, 1.5]).unwrap()).unwrap();
        assert!((decoded[0] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_values_clamp() {
        let mut q = ScalarQuantizer::new(8);
        q.train(&[vec![0.0], vec![1.0]]).unwrap();
        let low = q.decode(&q.encode(&[-5.0]).unwrap()).unwrap();
        let high = q.decode(&q.encode(&[5.0]).unwrap()).unwrap();
        assert!((low[0] - 0.0).abs() < 1e-6);
        assert!((high[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_with_codebook() {
        let mut q = ScalarQuantizer::new(8);
        q.train(&[vec![0.0, 1.0]]).unwrap();
        assert!(q.encode(&[1.0]).is_err());
        assert!(q.decode(&[0]).is_err());
    }

    #[test]
    fn test_close_resets_training() {
        let mut q = ScalarQuantizer::new(8);
        q.train(&[vec![0.0], vec![1.0]]).unwrap();
        q.close();
        assert!(!q.is_trained());
        assert!(q.encode(&[0.5]).is_err());
    }
}
