//! Vector quantization for reduced index footprint.
//!
//! A quantizer is trained from a sample, then encodes vectors into compact
//! codes and decodes them back to approximate vectors. Encoding before
//! training fails with `Quantization("not trained")`.
//!
//! # Module Structure
//!
//! - [`scalar`]: per-dimension uniform quantization ([`ScalarQuantizer`])
//! - [`product`]: per-partition k-means codebooks ([`ProductQuantizer`])

mod product;
mod scalar;

pub use product::ProductQuantizer;
pub use scalar::ScalarQuantizer;

use crate::config::QuantizerConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Statistics reported by a quantizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizerStats {
    /// Quantizer type name (e.g., "ScalarQuantizer").
    pub quantizer_type: String,
    /// Whether the quantizer has been trained.
    pub trained: bool,
    /// Trained dimension, if any.
    pub dimensions: Option<usize>,
    /// Bits per dimension (scalar).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<u8>,
    /// Number of subvectors (product).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subvectors: Option<usize>,
    /// Ratio of raw vector bytes to code bytes, once trained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f32>,
}

/// Compresses vectors into codes and reconstructs approximations.
pub trait Quantizer: Send + Sync {
    /// Learns quantization parameters from a sample of vectors.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or ragged sample, `Quantization`
    /// for a sample incompatible with the configuration.
    fn train(&mut self, samples: &[Vec<f32>]) -> Result<()>;

    /// Encodes a vector into a code.
    ///
    /// # Errors
    ///
    /// Returns `Quantization("not trained")` before training and on
    /// dimension mismatch with the trained codebook.
    fn encode(&self, vector: &[f32]) -> Result<Vec<u16>>;

    /// Reconstructs an approximate vector from a code.
    ///
    /// # Errors
    ///
    /// Returns `Quantization` if untrained or the code length mismatches.
    fn decode(&self, code: &[u16]) -> Result<Vec<f32>>;

    /// Trained dimension, or `None` before training.
    fn dimensions(&self) -> Option<usize>;

    /// Whether `train` has completed.
    fn is_trained(&self) -> bool;

    /// Quantizer statistics.
    fn stats(&self) -> QuantizerStats;

    /// Releases any learned state. Idempotent.
    fn close(&mut self);
}

/// Tagged quantizer held by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnyQuantizer {
    /// Per-dimension scalar quantization.
    Scalar(ScalarQuantizer),
    /// Product quantization.
    Product(ProductQuantizer),
}

impl AnyQuantizer {
    /// Creates an untrained quantizer from its configuration.
    #[must_use]
    pub fn from_config(config: &QuantizerConfig) -> Self {
        match *config {
            QuantizerConfig::Scalar { bits } => Self::Scalar(ScalarQuantizer::new(bits)),
            QuantizerConfig::Product { subvectors } => {
                Self::Product(ProductQuantizer::new(subvectors))
            }
        }
    }

    fn inner(&self) -> &dyn Quantizer {
        match self {
            Self::Scalar(q) => q,
            Self::Product(q) => q,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Quantizer {
        match self {
            Self::Scalar(q) => q,
            Self::Product(q) => q,
        }
    }
}

impl Quantizer for AnyQuantizer {
    fn train(&mut self, samples: &[Vec<f32>]) -> Result<()> {
        self.inner_mut().train(samples)
    }

    fn encode(&self, vector: &[f32]) -> Result<Vec<u16>> {
        self.inner().encode(vector)
    }

    fn decode(&self, code: &[u16]) -> Result<Vec<f32>> {
        self.inner().decode(code)
    }

    fn dimensions(&self) -> Option<usize> {
        self.inner().dimensions()
    }

    fn is_trained(&self) -> bool {
        self.inner().is_trained()
    }

    fn stats(&self) -> QuantizerStats {
        self.inner().stats()
    }

    fn close(&mut self) {
        self.inner_mut().close();
    }
}

pub(crate) fn check_sample(samples: &[Vec<f32>]) -> Result<usize> {
    use crate::error::Error;

    let Some(first) = samples.first() else {
        return Err(Error::InvalidInput(
            "training sample must not be empty".to_string(),
        ));
    };
    if first.is_empty() {
        return Err(Error::InvalidInput("empty vector".to_string()));
    }
    let dimension = first.len();
    for sample in samples {
        if sample.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: sample.len(),
            });
        }
    }
    Ok(dimension)
}
