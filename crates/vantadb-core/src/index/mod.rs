//! Vector indexes.
//!
//! Two implementations share the [`VectorIndex`] contract: [`HnswIndex`]
//! for approximate search and [`FlatIndex`] for exact scans over small
//! corpora. The coordinator holds one of them through the tagged [`Index`]
//! enum; open-world index extension is not a goal of the core.

mod flat;
pub mod hnsw;
mod ordered_float;

#[cfg(test)]
mod parity_tests;

pub use flat::FlatIndex;
pub use hnsw::{HnswIndex, HnswParams};

use crate::config::IndexConfig;
use crate::distance::DistanceMetric;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Statistics reported by an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Index type name ("HNSWIndex" or "FlatIndex").
    pub index_type: String,
    /// Distance metric, immutable for the life of the index.
    pub metric: DistanceMetric,
    /// Vector dimension, fixed by the first insert.
    pub dimensions: Option<usize>,
    /// Number of live (non-tombstoned) vectors.
    pub vector_count: usize,
    /// Number of tombstoned entries awaiting compaction.
    pub tombstone_count: usize,
    /// HNSW M parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<usize>,
    /// HNSW construction-time candidate list size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_construction: Option<usize>,
    /// HNSW search-time candidate list size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_search: Option<usize>,
    /// Number of populated graph layers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_count: Option<usize>,
    /// Neighbor selection heuristic variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_heuristic: Option<String>,
}

/// Searchable structure over external vector ids.
///
/// Implementations are internally synchronized: reads may run in parallel,
/// and the coordinator serializes writes against each other.
pub trait VectorIndex: Send + Sync {
    /// Inserts a vector under an external id. An existing id is updated
    /// (delete + insert) preserving the id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for empty vectors, NaN/infinite values, or a
    /// dimension mismatch; `Index` for graph-structural failures.
    fn insert(&self, id: &str, vector: &[f32]) -> Result<()>;

    /// Returns up to `k` `(id, distance)` pairs in ascending distance order.
    /// Never mutates the index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed query.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>>;

    /// Tombstones an id. Returns false if the id was not indexed.
    fn remove(&self, id: &str) -> bool;

    /// Returns true if the id is live in the index.
    fn contains(&self, id: &str) -> bool;

    /// Number of live vectors.
    fn len(&self) -> usize;

    /// Returns true if no live vectors are indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension, fixed by the first insert.
    fn dimensions(&self) -> Option<usize>;

    /// The distance metric chosen at creation.
    fn metric(&self) -> DistanceMetric;

    /// Index statistics.
    fn stats(&self) -> IndexStats;

    /// Reclaims tombstoned entries. Optional; never required for
    /// correctness.
    fn compact(&self);
}

/// Tagged index held by the coordinator.
#[derive(Debug)]
pub enum Index {
    /// HNSW approximate index.
    Hnsw(HnswIndex),
    /// Exact brute-force index.
    Flat(FlatIndex),
}

impl Index {
    /// Creates an index from its configuration.
    #[must_use]
    pub fn from_config(
        config: &IndexConfig,
        metric: DistanceMetric,
        dimensions: Option<usize>,
    ) -> Self {
        match *config {
            IndexConfig::Hnsw {
                m,
                ef_construction,
                ef_search,
            } => Self::Hnsw(HnswIndex::new(
                metric,
                HnswParams::new(m, ef_construction, ef_search),
                dimensions,
            )),
            IndexConfig::Flat => Self::Flat(FlatIndex::new(metric, dimensions)),
        }
    }

    fn inner(&self) -> &dyn VectorIndex {
        match self {
            Self::Hnsw(i) => i,
            Self::Flat(i) => i,
        }
    }
}

impl VectorIndex for Index {
    fn insert(&self, id: &str, vector: &[f32]) -> Result<()> {
        self.inner().insert(id, vector)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        self.inner().search(query, k)
    }

    fn remove(&self, id: &str) -> bool {
        self.inner().remove(id)
    }

    fn contains(&self, id: &str) -> bool {
        self.inner().contains(id)
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn dimensions(&self) -> Option<usize> {
        self.inner().dimensions()
    }

    fn metric(&self) -> DistanceMetric {
        self.inner().metric()
    }

    fn stats(&self) -> IndexStats {
        self.inner().stats()
    }

    fn compact(&self) {
        self.inner().compact();
    }
}

/// Validates a vector at the index boundary.
pub(crate) fn check_vector(vector: &[f32], dimensions: Option<usize>) -> Result<()> {
    use crate::error::Error;

    if vector.is_empty() {
        return Err(Error::InvalidInput("empty vector".to_string()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(
            "vector contains NaN or infinite values".to_string(),
        ));
    }
    if let Some(expected) = dimensions {
        if vector.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
    }
    Ok(())
}
