//! HNSW graph structure.
//!
//! Hierarchical navigable small-world graph as described in the
//! Malkov & Yashunin paper. Nodes live in a dense pool indexed by integer
//! handles; adjacency is stored as lists of handles per layer. Deletion is
//! a tombstone bit: tombstoned nodes are traversed for connectivity but
//! never returned.
//!
//! Searches may run in parallel; the coordinator serializes mutating calls
//! (`insert`, `delete`, `compact`) against each other.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::hnsw::layer::{Layer, NodeId};
use crate::index::hnsw::params::HnswParams;
use crate::index::ordered_float::OrderedFloat;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Hard cap on the layer draw. Layers beyond this carry no routing value
/// for any realistic corpus size.
const MAX_LEVEL: usize = 16;

/// Serializable image of the whole graph, used by the persistence module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GraphSnapshot {
    pub vectors: Vec<Vec<f32>>,
    pub levels: Vec<usize>,
    pub tombstones: Vec<bool>,
    /// `adjacency[layer][node]` lists the node's neighbors on that layer.
    pub adjacency: Vec<Vec<Vec<NodeId>>>,
    pub entry_point: Option<(NodeId, usize)>,
}

/// The HNSW graph over dense node handles.
#[derive(Debug)]
pub(super) struct HnswGraph {
    metric: DistanceMetric,
    params: HnswParams,
    /// Node table: handle -> vector (exact or quantizer-reconstructed).
    vectors: RwLock<Vec<Vec<f32>>>,
    /// handle -> top layer the node participates in.
    node_levels: RwLock<Vec<usize>>,
    /// handle -> tombstone bit.
    tombstones: RwLock<Vec<bool>>,
    /// Layer 0 is the bottom, densely connected layer.
    layers: RwLock<Vec<Layer>>,
    /// Where every search and insert descent begins.
    entry_point: RwLock<Option<(NodeId, usize)>>,
    live_count: AtomicUsize,
    /// xorshift64 state for the geometric layer draw.
    rng_state: AtomicU64,
    level_mult: f64,
}

impl HnswGraph {
    pub(super) fn new(metric: DistanceMetric, params: HnswParams) -> Self {
        Self {
            metric,
            params,
            vectors: RwLock::new(Vec::new()),
            node_levels: RwLock::new(Vec::new()),
            tombstones: RwLock::new(Vec::new()),
            layers: RwLock::new(vec![Layer::new(0)]),
            entry_point: RwLock::new(None),
            live_count: AtomicUsize::new(0),
            rng_state: AtomicU64::new(0x5DEE_CE66_D1A4_B5B5),
            level_mult: params.level_multiplier(),
        }
    }

    pub(super) fn len(&self) -> usize {
        self.live_count.load(Ordering::Relaxed)
    }

    pub(super) fn tombstone_count(&self) -> usize {
        self.tombstones.read().iter().filter(|t| **t).count()
    }

    pub(super) fn layer_count(&self) -> usize {
        if self.vectors.read().is_empty() {
            0
        } else {
            self.layers.read().len()
        }
    }

    pub(super) const fn params(&self) -> &HnswParams {
        &self.params
    }

    fn get_vector(&self, node: NodeId) -> Vec<f32> {
        self.vectors.read()[node].clone()
    }

    /// Draws a node's top layer from the geometric distribution
    /// `floor(-ln(u) * mL)` with `mL = 1 / ln(M)`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn random_level(&self) -> usize {
        // xorshift64; state is never zero because the seed is fixed.
        let mut state = self.rng_state.load(Ordering::Relaxed);
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        self.rng_state.store(state, Ordering::Relaxed);

        // Map to u in (0, 1]; ln(u) is finite for u > 0.
        let uniform = ((state >> 11) as f64 + 1.0) / (1u64 << 53) as f64;
        let level = (-uniform.ln() * self.level_mult).floor() as usize;
        level.min(MAX_LEVEL)
    }

    /// Inserts a vector and returns its handle.
    ///
    /// On failure the partially linked node is unlinked and retired before
    /// the error surfaces, leaving the graph consistent.
    pub(super) fn insert(&self, vector: Vec<f32>) -> Result<NodeId> {
        let level = self.random_level();
        let handle = {
            let mut vectors = self.vectors.write();
            let mut levels = self.node_levels.write();
            let mut tombstones = self.tombstones.write();
            let handle = vectors.len();
            vectors.push(vector);
            levels.push(level);
            tombstones.push(false);
            handle
        };

        {
            let mut layers = self.layers.write();
            while layers.len() <= level {
                layers.push(Layer::new(handle + 1));
            }
            for layer in layers.iter_mut() {
                layer.ensure_capacity(handle);
            }
        }

        let entry = *self.entry_point.read();
        let Some((ep, max_level)) = entry else {
            *self.entry_point.write() = Some((handle, level));
            self.live_count.fetch_add(1, Ordering::Relaxed);
            return Ok(handle);
        };

        if let Err(e) = self.link(handle, level, ep, max_level) {
            self.retire(handle, level);
            return Err(e);
        }

        if level > max_level {
            *self.entry_point.write() = Some((handle, level));
        }
        self.live_count.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Connects a freshly allocated node into every layer it participates in.
    fn link(&self, handle: NodeId, level: usize, ep: NodeId, max_level: usize) -> Result<()> {
        if ep >= self.vectors.read().len() {
            return Err(Error::Index(format!("entry point handle {ep} out of range")));
        }

        let query = self.get_vector(handle);

        // Descent: greedy walk through the layers above the node's level.
        let mut current = ep;
        for layer in (level + 1..=max_level).rev() {
            current = self.greedy_walk(&query, current, layer);
        }

        // Layered connect from min(level, max_level) down to 0.
        for layer in (0..=level.min(max_level)).rev() {
            let candidates =
                self.search_layer(&query, vec![current], self.params.ef_construction, layer);
            let cap = if layer == 0 {
                self.params.m_max0
            } else {
                self.params.m_max
            };
            let selected = self.select_neighbors(&candidates, cap);

            self.layers.read()[layer].set_neighbors(handle, selected.clone());
            for &neighbor in &selected {
                self.link_back(handle, neighbor, layer, cap);
            }

            if let Some(&(nearest, _)) = candidates.first() {
                current = nearest;
            }
        }
        Ok(())
    }

    /// Greedy walk at one layer: hop to any neighbor closer to the query
    /// until no neighbor improves. Tombstoned nodes still route.
    fn greedy_walk(&self, query: &[f32], entry: NodeId, layer: usize) -> NodeId {
        let mut best = entry;
        let mut best_dist = self.metric.distance_infallible(query, &self.get_vector(best));
        loop {
            let neighbors = self.layers.read()[layer].get_neighbors(best);
            let mut improved = false;
            for neighbor in neighbors {
                let dist = self
                    .metric
                    .distance_infallible(query, &self.get_vector(neighbor));
                if dist < best_dist {
                    best = neighbor;
                    best_dist = dist;
                    improved = true;
                }
            }
            if !improved {
                break;
            }
        }
        best
    }

    /// Standard HNSW layer search: a candidate min-heap and a bounded
    /// result max-heap of size `ef`. Tombstoned nodes are expanded for
    /// connectivity but never enter the result heap.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: Vec<NodeId>,
        ef: usize,
        layer: usize,
    ) -> Vec<(NodeId, f32)> {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut candidates: BinaryHeap<Reverse<(OrderedFloat, NodeId)>> = BinaryHeap::new();
        let mut results: BinaryHeap<(OrderedFloat, NodeId)> = BinaryHeap::new();

        // One vectors lock for the whole search.
        let vectors = self.vectors.read();
        let tombstones = self.tombstones.read();

        for ep in entry_points {
            if ep >= vectors.len() || !visited.insert(ep) {
                continue;
            }
            let dist = self.metric.distance_infallible(query, &vectors[ep]);
            candidates.push(Reverse((OrderedFloat(dist), ep)));
            if !tombstones[ep] {
                results.push((OrderedFloat(dist), ep));
            }
        }

        while let Some(Reverse((OrderedFloat(c_dist), c_node))) = candidates.pop() {
            let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);
            if c_dist > furthest && results.len() >= ef {
                break;
            }

            let neighbors = self.layers.read()[layer].get_neighbors(c_node);
            for neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let dist = self.metric.distance_infallible(query, &vectors[neighbor]);
                let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);
                if dist < furthest || results.len() < ef {
                    candidates.push(Reverse((OrderedFloat(dist), neighbor)));
                    if !tombstones[neighbor] {
                        results.push((OrderedFloat(dist), neighbor));
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<(NodeId, f32)> = results.into_iter().map(|(d, n)| (n, d.0)).collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    /// Diversity selection over a candidate pool sorted by proximity to the
    /// query: a candidate joins the result iff no already-selected node is
    /// closer to it than it is to the query. The nearest `keep_floor`
    /// candidates join unconditionally.
    fn select_neighbors(&self, candidates: &[(NodeId, f32)], cap: usize) -> Vec<NodeId> {
        if candidates.len() <= cap && candidates.len() <= self.params.keep_floor {
            return candidates.iter().map(|&(node, _)| node).collect();
        }

        let mut selected: Vec<(NodeId, Vec<f32>)> = Vec::with_capacity(cap);
        for &(candidate, candidate_dist) in candidates {
            if selected.len() >= cap {
                break;
            }
            let candidate_vec = self.get_vector(candidate);
            if selected.len() < self.params.keep_floor {
                selected.push((candidate, candidate_vec));
                continue;
            }
            let diverse = selected.iter().all(|(_, selected_vec)| {
                self.metric
                    .distance_infallible(&candidate_vec, selected_vec)
                    >= candidate_dist
            });
            if diverse {
                selected.push((candidate, candidate_vec));
            }
        }
        selected.into_iter().map(|(node, _)| node).collect()
    }

    /// Adds the reverse edge `neighbor -> new_node`, re-running the
    /// selection heuristic when the neighbor's degree overflows its cap.
    fn link_back(&self, new_node: NodeId, neighbor: NodeId, layer: usize, cap: usize) {
        let mut neighbors = {
            let layers = self.layers.read();
            layers[layer].get_neighbors(neighbor)
        };
        if neighbors.contains(&new_node) {
            return;
        }
        neighbors.push(new_node);

        if neighbors.len() <= cap {
            self.layers.read()[layer].set_neighbors(neighbor, neighbors);
            return;
        }

        // Degree overflow: prune with the heuristic over the full
        // neighborhood, ordered by distance to the overflowing node.
        let neighbor_vec = self.get_vector(neighbor);
        let mut with_dist: Vec<(NodeId, f32)> = neighbors
            .into_iter()
            .map(|n| {
                (
                    n,
                    self.metric
                        .distance_infallible(&neighbor_vec, &self.get_vector(n)),
                )
            })
            .collect();
        with_dist.sort_by(|a, b| a.1.total_cmp(&b.1));
        let pruned = self.select_neighbors(&with_dist, cap);
        self.layers.read()[layer].set_neighbors(neighbor, pruned);
    }

    /// Unlinks a partially inserted node and tombstones its handle. Called
    /// only on the insert failure path, before the error surfaces.
    fn retire(&self, handle: NodeId, level: usize) {
        {
            let layers = self.layers.read();
            for layer in layers.iter().take(level + 1) {
                for neighbor in layer.get_neighbors(handle) {
                    let mut list = layer.get_neighbors(neighbor);
                    list.retain(|&n| n != handle);
                    layer.set_neighbors(neighbor, list);
                }
                layer.set_neighbors(handle, Vec::new());
            }
        }
        self.tombstones.write()[handle] = true;
    }

    /// Searches for the `k` nearest live nodes.
    pub(super) fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<(NodeId, f32)> {
        let Some((ep, max_level)) = *self.entry_point.read() else {
            return Vec::new();
        };

        let mut current = ep;
        for layer in (1..=max_level).rev() {
            current = self.greedy_walk(query, current, layer);
        }

        let candidates = self.search_layer(query, vec![current], ef.max(k), 0);
        candidates.into_iter().take(k).collect()
    }

    /// Tombstones a handle. Neighbor lists are left intact so the node keeps
    /// routing traversals. Returns false if already tombstoned or unknown.
    pub(super) fn delete(&self, handle: NodeId) -> bool {
        let mut tombstones = self.tombstones.write();
        if handle >= tombstones.len() || tombstones[handle] {
            return false;
        }
        tombstones[handle] = true;
        drop(tombstones);
        self.live_count.fetch_sub(1, Ordering::Relaxed);
        true
    }

    /// Rewires the neighborhoods of deleted nodes' neighbors and clears the
    /// deleted adjacency. Handles are not reused.
    pub(super) fn compact(&self) {
        let tombstoned: Vec<NodeId> = {
            let tombstones = self.tombstones.read();
            tombstones
                .iter()
                .enumerate()
                .filter_map(|(node, dead)| dead.then_some(node))
                .collect()
        };
        if tombstoned.is_empty() {
            return;
        }
        let is_dead: FxHashSet<NodeId> = tombstoned.iter().copied().collect();

        {
            let layers = self.layers.read();
            for (layer_idx, layer) in layers.iter().enumerate() {
                let cap = if layer_idx == 0 {
                    self.params.m_max0
                } else {
                    self.params.m_max
                };
                for &dead in &tombstoned {
                    let dead_neighbors = layer.get_neighbors(dead);
                    if dead_neighbors.is_empty() {
                        continue;
                    }
                    for &survivor in &dead_neighbors {
                        if is_dead.contains(&survivor) {
                            continue;
                        }
                        // Candidate pool: the survivor's neighborhood plus the
                        // deleted node's, minus tombstones and itself.
                        let mut pool: Vec<NodeId> = layer.get_neighbors(survivor);
                        pool.extend(dead_neighbors.iter().copied());
                        pool.sort_unstable();
                        pool.dedup();
                        pool.retain(|&n| n != survivor && !is_dead.contains(&n));

                        let survivor_vec = self.get_vector(survivor);
                        let mut with_dist: Vec<(NodeId, f32)> = pool
                            .into_iter()
                            .map(|n| {
                                (
                                    n,
                                    self.metric
                                        .distance_infallible(&survivor_vec, &self.get_vector(n)),
                                )
                            })
                            .collect();
                        with_dist.sort_by(|a, b| a.1.total_cmp(&b.1));
                        let rewired = self.select_neighbors(&with_dist, cap);
                        layer.set_neighbors(survivor, rewired);
                    }
                    layer.set_neighbors(dead, Vec::new());
                }
            }
        }

        // Re-seat the entry point on a live node if it was deleted.
        let entry_dead = self
            .entry_point
            .read()
            .is_some_and(|(ep, _)| is_dead.contains(&ep));
        if entry_dead {
            let levels = self.node_levels.read();
            let tombstones = self.tombstones.read();
            let replacement = levels
                .iter()
                .enumerate()
                .filter(|&(node, _)| !tombstones[node])
                .max_by_key(|&(_, level)| *level)
                .map(|(node, &level)| (node, level));
            *self.entry_point.write() = replacement;
        }
    }

    pub(super) fn to_snapshot(&self) -> GraphSnapshot {
        let vectors = self.vectors.read().clone();
        let levels = self.node_levels.read().clone();
        let tombstones = self.tombstones.read().clone();
        let layers = self.layers.read();
        let adjacency = layers
            .iter()
            .map(|layer| {
                (0..vectors.len())
                    .map(|node| layer.get_neighbors(node))
                    .collect()
            })
            .collect();
        GraphSnapshot {
            vectors,
            levels,
            tombstones,
            adjacency,
            entry_point: *self.entry_point.read(),
        }
    }

    pub(super) fn from_snapshot(
        metric: DistanceMetric,
        params: HnswParams,
        snapshot: GraphSnapshot,
    ) -> Result<Self> {
        let node_count = snapshot.vectors.len();
        if snapshot.levels.len() != node_count || snapshot.tombstones.len() != node_count {
            return Err(Error::Index(
                "graph snapshot tables disagree on node count".to_string(),
            ));
        }
        let live = snapshot.tombstones.iter().filter(|t| !**t).count();

        let mut layers = Vec::with_capacity(snapshot.adjacency.len().max(1));
        for layer_lists in &snapshot.adjacency {
            let layer = Layer::new(node_count);
            for (node, neighbors) in layer_lists.iter().enumerate() {
                if neighbors.iter().any(|&n| n >= node_count) {
                    return Err(Error::Index(
                        "graph snapshot references an unknown handle".to_string(),
                    ));
                }
                layer.set_neighbors(node, neighbors.clone());
            }
            layers.push(layer);
        }
        if layers.is_empty() {
            layers.push(Layer::new(node_count));
        }

        Ok(Self {
            metric,
            params,
            vectors: RwLock::new(snapshot.vectors),
            node_levels: RwLock::new(snapshot.levels),
            tombstones: RwLock::new(snapshot.tombstones),
            layers: RwLock::new(layers),
            entry_point: RwLock::new(snapshot.entry_point),
            live_count: AtomicUsize::new(live),
            rng_state: AtomicU64::new(0x5DEE_CE66_D1A4_B5B5),
            level_mult: params.level_multiplier(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_graph(vectors: &[Vec<f32>]) -> HnswGraph {
        let graph = HnswGraph::new(DistanceMetric::Euclidean, HnswParams::new(8, 100, 40));
        for v in vectors {
            graph.insert(v.clone()).unwrap();
        }
        graph
    }

    fn grid_vectors(n: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x = (i % 10) as f32;
                #[allow(clippy::cast_precision_loss)]
                let y = (i / 10) as f32;
                vec![x, y]
            })
            .collect()
    }

    #[test]
    fn test_empty_graph_returns_empty() {
        let graph = HnswGraph::new(DistanceMetric::Euclidean, HnswParams::default());
        assert!(graph.search(&[1.0, 2.0], 5, 50).is_empty());
        assert_eq!(graph.len(), 0);
        assert_eq!(graph.layer_count(), 0);
    }

    #[test]
    fn test_insert_and_exact_hit() {
        let vectors = grid_vectors(100);
        let graph = build_graph(&vectors);
        assert_eq!(graph.len(), 100);

        for (handle, v) in vectors.iter().enumerate().step_by(7) {
            let results = graph.search(v, 1, 50);
            assert_eq!(results[0].0, handle, "query {v:?}");
            assert!(results[0].1 < 1e-6);
        }
    }

    #[test]
    fn test_results_sorted_ascending() {
        let graph = build_graph(&grid_vectors(100));
        let results = graph.search(&[4.5, 4.5], 10, 50);
        assert_eq!(results.len(), 10);
        for pair in results.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_tombstoned_node_is_skipped_but_routes() {
        let vectors = grid_vectors(100);
        let graph = build_graph(&vectors);

        assert!(graph.delete(42));
        assert!(!graph.delete(42));
        assert_eq!(graph.len(), 99);
        assert_eq!(graph.tombstone_count(), 1);

        let results = graph.search(&vectors[42], 10, 50);
        assert!(results.iter().all(|&(node, _)| node != 42));
        // Connectivity survives: neighbors of the hole are still reachable.
        assert_eq!(results.len(), 10);
    }

    #[test]
    fn test_compact_rewires_and_clears() {
        let vectors = grid_vectors(100);
        let graph = build_graph(&vectors);
        for handle in [0, 10, 20, 30] {
            graph.delete(handle);
        }
        graph.compact();
        assert_eq!(graph.len(), 96);

        let results = graph.search(&[5.0, 5.0], 20, 80);
        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|&(n, _)| ![0, 10, 20, 30].contains(&n)));
    }

    #[test]
    fn test_compact_reseats_entry_point() {
        let vectors = grid_vectors(50);
        let graph = build_graph(&vectors);
        let (ep, _) = graph.entry_point.read().unwrap();
        graph.delete(ep);
        graph.compact();
        let new_entry = graph.entry_point.read().unwrap();
        assert_ne!(new_entry.0, ep);
        assert!(!graph.tombstones.read()[new_entry.0]);
    }

    #[test]
    fn test_level_draw_is_geometric() {
        let graph = HnswGraph::new(DistanceMetric::Euclidean, HnswParams::default());
        let mut counts = [0usize; 4];
        for _ in 0..10_000 {
            let level = graph.random_level().min(3);
            counts[level] += 1;
        }
        // With mL = 1/ln(16), P(level 0) ≈ 1 - e^(-ln 16) ≈ 0.9375.
        assert!(counts[0] > 9_000);
        assert!(counts[1] < 1_000);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let vectors = grid_vectors(60);
        let graph = build_graph(&vectors);
        graph.delete(7);

        let snapshot = graph.to_snapshot();
        let restored = HnswGraph::from_snapshot(
            DistanceMetric::Euclidean,
            *graph.params(),
            snapshot,
        )
        .unwrap();

        assert_eq!(restored.len(), graph.len());
        let a = graph.search(&[3.3, 6.1], 5, 50);
        let b = restored.search(&[3.3, 6.1], 5, 50);
        assert_eq!(a, b);
    }

    #[test]
    fn test_snapshot_rejects_bad_handles() {
        let graph = build_graph(&grid_vectors(10));
        let mut snapshot = graph.to_snapshot();
        snapshot.adjacency[0][0] = vec![999];
        assert!(HnswGraph::from_snapshot(
            DistanceMetric::Euclidean,
            HnswParams::default(),
            snapshot
        )
        .is_err());
    }
}
