//! Public HNSW index over external string ids.
//!
//! Wraps the graph with the bidirectional id ↔ handle mapping, input
//! validation, and stats. Re-inserting an existing id is an update: the old
//! handle is tombstoned and the id moves to a fresh handle.

use crate::distance::DistanceMetric;
use crate::error::Result;
use crate::index::hnsw::graph::{GraphSnapshot, HnswGraph};
use crate::index::hnsw::layer::NodeId;
use crate::index::hnsw::params::HnswParams;
use crate::index::{check_vector, IndexStats, VectorIndex};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serializable image of the index, used by the persistence module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HnswIndexSnapshot {
    pub graph: GraphSnapshot,
    /// Live id -> handle pairs.
    pub ids: Vec<(String, NodeId)>,
    /// 0 when no vector has fixed the dimension yet.
    pub dimensions: usize,
}

/// HNSW index for approximate nearest neighbor search.
#[derive(Debug)]
pub struct HnswIndex {
    graph: HnswGraph,
    metric: DistanceMetric,
    params: HnswParams,
    id_to_handle: RwLock<FxHashMap<String, NodeId>>,
    handle_to_id: RwLock<FxHashMap<NodeId, String>>,
    dimensions: AtomicUsize,
    ef_search: AtomicUsize,
}

impl HnswIndex {
    /// Creates an empty HNSW index.
    #[must_use]
    pub fn new(metric: DistanceMetric, params: HnswParams, dimensions: Option<usize>) -> Self {
        Self {
            graph: HnswGraph::new(metric, params),
            metric,
            params,
            id_to_handle: RwLock::new(FxHashMap::default()),
            handle_to_id: RwLock::new(FxHashMap::default()),
            dimensions: AtomicUsize::new(dimensions.unwrap_or(0)),
            ef_search: AtomicUsize::new(params.ef_search),
        }
    }

    /// Current search-time candidate list size.
    #[must_use]
    pub fn ef_search(&self) -> usize {
        self.ef_search.load(Ordering::Relaxed)
    }

    /// Adjusts the search-time candidate list size at runtime.
    pub fn set_ef_search(&self, ef_search: usize) {
        self.ef_search.store(ef_search.max(1), Ordering::Relaxed);
    }

    /// The construction parameters.
    #[must_use]
    pub const fn params(&self) -> &HnswParams {
        &self.params
    }

    fn expected_dimensions(&self) -> Option<usize> {
        match self.dimensions.load(Ordering::Relaxed) {
            0 => None,
            d => Some(d),
        }
    }

    pub(crate) fn snapshot(&self) -> HnswIndexSnapshot {
        HnswIndexSnapshot {
            graph: self.graph.to_snapshot(),
            ids: self
                .id_to_handle
                .read()
                .iter()
                .map(|(id, &handle)| (id.clone(), handle))
                .collect(),
            dimensions: self.dimensions.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn from_parts(
        metric: DistanceMetric,
        params: HnswParams,
        snapshot: HnswIndexSnapshot,
    ) -> Result<Self> {
        let graph = HnswGraph::from_snapshot(metric, params, snapshot.graph)?;
        let mut id_to_handle = FxHashMap::default();
        let mut handle_to_id = FxHashMap::default();
        for (id, handle) in snapshot.ids {
            id_to_handle.insert(id.clone(), handle);
            handle_to_id.insert(handle, id);
        }
        Ok(Self {
            graph,
            metric,
            params,
            id_to_handle: RwLock::new(id_to_handle),
            handle_to_id: RwLock::new(handle_to_id),
            dimensions: AtomicUsize::new(snapshot.dimensions),
            ef_search: AtomicUsize::new(params.ef_search),
        })
    }
}

impl VectorIndex for HnswIndex {
    fn insert(&self, id: &str, vector: &[f32]) -> Result<()> {
        check_vector(vector, self.expected_dimensions())?;

        // Link the new node first: if the graph rejects it (the failed
        // node is retired internally), the previous registration for this
        // id must survive untouched.
        let handle = self.graph.insert(vector.to_vec())?;
        self.dimensions.store(vector.len(), Ordering::Relaxed);

        let mut id_to_handle = self.id_to_handle.write();
        let mut handle_to_id = self.handle_to_id.write();
        if let Some(old_handle) = id_to_handle.insert(id.to_string(), handle) {
            // Update: the old handle is retired only now that the new one
            // is fully linked.
            self.graph.delete(old_handle);
            handle_to_id.remove(&old_handle);
        }
        handle_to_id.insert(handle, id.to_string());
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        if self.graph.len() == 0 || k == 0 {
            return Ok(Vec::new());
        }
        check_vector(query, self.expected_dimensions())?;

        let ef = self.ef_search().max(k);
        let handles = self.graph.search(query, k, ef);
        let handle_to_id = self.handle_to_id.read();
        Ok(handles
            .into_iter()
            .filter_map(|(handle, dist)| {
                handle_to_id.get(&handle).map(|id| (id.clone(), dist))
            })
            .collect())
    }

    fn remove(&self, id: &str) -> bool {
        let Some(handle) = self.id_to_handle.write().remove(id) else {
            return false;
        };
        self.handle_to_id.write().remove(&handle);
        self.graph.delete(handle)
    }

    fn contains(&self, id: &str) -> bool {
        self.id_to_handle.read().contains_key(id)
    }

    fn len(&self) -> usize {
        self.graph.len()
    }

    fn dimensions(&self) -> Option<usize> {
        self.expected_dimensions()
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            index_type: "HNSWIndex".to_string(),
            metric: self.metric,
            dimensions: self.expected_dimensions(),
            vector_count: self.graph.len(),
            tombstone_count: self.graph.tombstone_count(),
            m: Some(self.params.m),
            ef_construction: Some(self.params.ef_construction),
            ef_search: Some(self.ef_search()),
            layer_count: Some(self.graph.layer_count()),
            selection_heuristic: Some("simple".to_string()),
        }
    }

    fn compact(&self) {
        self.graph.compact();
    }
}
