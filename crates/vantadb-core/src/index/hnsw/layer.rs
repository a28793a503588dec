//! A single layer of the HNSW hierarchy.

use parking_lot::RwLock;

/// Dense integer handle identifying a node inside the index. Distinct from
/// the externally visible id.
pub type NodeId = usize;

/// Adjacency lists for one layer.
#[derive(Debug)]
pub(super) struct Layer {
    /// `neighbors[node]` holds the node's neighbor handles on this layer.
    neighbors: Vec<RwLock<Vec<NodeId>>>,
}

impl Layer {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            neighbors: (0..capacity).map(|_| RwLock::new(Vec::new())).collect(),
        }
    }

    pub(super) fn ensure_capacity(&mut self, node: NodeId) {
        while self.neighbors.len() <= node {
            self.neighbors.push(RwLock::new(Vec::new()));
        }
    }

    pub(super) fn get_neighbors(&self, node: NodeId) -> Vec<NodeId> {
        if node < self.neighbors.len() {
            self.neighbors[node].read().clone()
        } else {
            Vec::new()
        }
    }

    pub(super) fn set_neighbors(&self, node: NodeId, neighbors: Vec<NodeId>) {
        if node < self.neighbors.len() {
            *self.neighbors[node].write() = neighbors;
        }
    }
}
