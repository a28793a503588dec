//! Exact brute-force index.
//!
//! Insert appends to an insertion-ordered entry list; search evaluates the
//! metric against every live entry and keeps the top-k in a bounded heap,
//! breaking distance ties by insertion order. Delete is a tombstone;
//! `compact()` drops tombstoned entries.
//!
//! The flat index is the default for small corpora and doubles as the
//! correctness oracle for HNSW recall tests.

use crate::distance::DistanceMetric;
use crate::error::Result;
use crate::index::ordered_float::OrderedFloat;
use crate::index::{check_vector, IndexStats, VectorIndex};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct FlatEntry {
    id: String,
    vector: Vec<f32>,
    deleted: bool,
}

/// Exact scan index.
#[derive(Debug)]
pub struct FlatIndex {
    metric: DistanceMetric,
    entries: RwLock<Vec<FlatEntry>>,
    /// id -> position of the live entry in `entries`.
    id_map: RwLock<FxHashMap<String, usize>>,
    dimensions: AtomicUsize,
    live: AtomicUsize,
}

impl FlatIndex {
    /// Creates an empty flat index.
    #[must_use]
    pub fn new(metric: DistanceMetric, dimensions: Option<usize>) -> Self {
        Self {
            metric,
            entries: RwLock::new(Vec::new()),
            id_map: RwLock::new(FxHashMap::default()),
            dimensions: AtomicUsize::new(dimensions.unwrap_or(0)),
            live: AtomicUsize::new(0),
        }
    }

    fn expected_dimensions(&self) -> Option<usize> {
        match self.dimensions.load(Ordering::Relaxed) {
            0 => None,
            d => Some(d),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&self, id: &str, vector: &[f32]) -> Result<()> {
        check_vector(vector, self.expected_dimensions())?;
        self.dimensions.store(vector.len(), Ordering::Relaxed);

        let mut entries = self.entries.write();
        let mut id_map = self.id_map.write();

        // Update keeps the external id but takes a fresh slot, so tie
        // ordering reflects the re-insertion.
        if let Some(&old) = id_map.get(id) {
            entries[old].deleted = true;
            self.live.fetch_sub(1, Ordering::Relaxed);
        }

        let position = entries.len();
        entries.push(FlatEntry {
            id: id.to_string(),
            vector: vector.to_vec(),
            deleted: false,
        });
        id_map.insert(id.to_string(), position);
        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        if self.live.load(Ordering::Relaxed) == 0 || k == 0 {
            return Ok(Vec::new());
        }
        check_vector(query, self.expected_dimensions())?;

        let entries = self.entries.read();
        // Max-heap of (distance, insertion seq): the worst candidate sits on
        // top, and equal distances evict the later insertion first.
        let mut heap: BinaryHeap<(OrderedFloat, usize)> = BinaryHeap::with_capacity(k + 1);
        for (seq, entry) in entries.iter().enumerate() {
            if entry.deleted {
                continue;
            }
            let dist = self.metric.distance(query, &entry.vector)?;
            heap.push((OrderedFloat(dist), seq));
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut results: Vec<(OrderedFloat, usize)> = heap.into_vec();
        results.sort_unstable();
        Ok(results
            .into_iter()
            .map(|(dist, seq)| (entries[seq].id.clone(), dist.0))
            .collect())
    }

    fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        let mut id_map = self.id_map.write();
        match id_map.remove(id) {
            Some(position) => {
                entries[position].deleted = true;
                self.live.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.id_map.read().contains_key(id)
    }

    fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    fn dimensions(&self) -> Option<usize> {
        self.expected_dimensions()
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn stats(&self) -> IndexStats {
        let entries = self.entries.read();
        IndexStats {
            index_type: "FlatIndex".to_string(),
            metric: self.metric,
            dimensions: self.expected_dimensions(),
            vector_count: self.len(),
            tombstone_count: entries.len() - self.len(),
            m: None,
            ef_construction: None,
            ef_search: None,
            layer_count: None,
            selection_heuristic: None,
        }
    }

    fn compact(&self) {
        let mut entries = self.entries.write();
        let mut id_map = self.id_map.write();
        entries.retain(|e| !e.deleted);
        id_map.clear();
        for (position, entry) in entries.iter().enumerate() {
            id_map.insert(entry.id.clone(), position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn build() -> FlatIndex {
        let index = FlatIndex::new(DistanceMetric::Euclidean, None);
        index.insert("a", &[0.0, 0.0]).unwrap();
        index.insert("b", &[1.0, 0.0]).unwrap();
        index.insert("c", &[0.0, 2.0]).unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = build();
        let results = index.search(&[0.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(results[0].1 < results[1].1);
    }

    #[test]
    fn test_search_k_truncates() {
        let index = build();
        assert_eq!(index.search(&[0.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(index.search(&[0.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let index = FlatIndex::new(DistanceMetric::Euclidean, None);
        index.insert("first", &[1.0, 0.0]).unwrap();
        index.insert("second", &[0.0, 1.0]).unwrap();
        index.insert("third", &[-1.0, 0.0]).unwrap();

        let results = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(results[0].0, "first");
        assert_eq!(results[1].0, "second");
    }

    #[test]
    fn test_delete_is_tombstone() {
        let index = build();
        assert!(index.remove("b"));
        assert!(!index.remove("b"));
        assert_eq!(index.len(), 2);
        assert_eq!(index.stats().tombstone_count, 1);

        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert!(results.iter().all(|(id, _)| id != "b"));

        index.compact();
        assert_eq!(index.stats().tombstone_count, 0);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_update_replaces_vector() {
        let index = build();
        index.insert("a", &[5.0, 5.0]).unwrap();
        assert_eq!(index.len(), 3);
        let results = index.search(&[5.0, 5.0], 1).unwrap();
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn test_dimension_lock() {
        let index = build();
        assert!(matches!(
            index.insert("d", &[1.0, 2.0, 3.0]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_non_finite() {
        let index = FlatIndex::new(DistanceMetric::Euclidean, None);
        assert!(index.insert("nan", &[f32::NAN, 0.0]).is_err());
        assert!(index.insert("inf", &[f32::INFINITY, 0.0]).is_err());
        assert!(index.insert("empty", &[]).is_err());
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let index = FlatIndex::new(DistanceMetric::Cosine, None);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }
}
