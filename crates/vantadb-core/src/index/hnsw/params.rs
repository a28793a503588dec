//! HNSW index parameters.

use serde::{Deserialize, Serialize};

/// HNSW parameters for tuning recall, memory, and build speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Target degree on upper layers (M). Higher = better recall, more
    /// memory, slower insert.
    pub m: usize,
    /// Degree cap on upper layers. Conventionally `M`.
    pub m_max: usize,
    /// Degree cap on layer 0. Conventionally `2 * M`.
    pub m_max0: usize,
    /// Candidate list size during construction. Higher = better recall,
    /// slower indexing.
    pub ef_construction: usize,
    /// Candidate list size during search. Raised to `k` when smaller.
    pub ef_search: usize,
    /// Number of nearest candidates the selection heuristic includes
    /// unconditionally, preventing neighbor starvation in dense clusters.
    pub keep_floor: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self::new(16, 200, 50)
    }
}

impl HnswParams {
    /// Creates parameters with conventional degree caps (`m_max = m`,
    /// `m_max0 = 2 * m`) and a keep floor of 1.
    #[must_use]
    pub const fn new(m: usize, ef_construction: usize, ef_search: usize) -> Self {
        Self {
            m,
            m_max: m,
            m_max0: m * 2,
            ef_construction,
            ef_search,
            keep_floor: 1,
        }
    }

    /// Creates parameters optimized for high recall at the cost of build
    /// time and memory.
    #[must_use]
    pub const fn high_recall() -> Self {
        Self::new(32, 400, 128)
    }

    /// Creates parameters optimized for insertion speed. Lower recall;
    /// best for bulk loading and development.
    #[must_use]
    pub const fn fast() -> Self {
        Self::new(8, 100, 40)
    }

    /// The level multiplier `mL = 1 / ln(M)` for the geometric layer draw.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn level_multiplier(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_caps() {
        let params = HnswParams::new(16, 200, 50);
        assert_eq!(params.m_max, 16);
        assert_eq!(params.m_max0, 32);
    }

    #[test]
    fn test_level_multiplier() {
        let params = HnswParams::new(16, 200, 50);
        assert!((params.level_multiplier() - 1.0 / 16.0_f64.ln()).abs() < 1e-12);
    }
}
