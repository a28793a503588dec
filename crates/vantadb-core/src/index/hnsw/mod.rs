//! HNSW (Hierarchical Navigable Small World) index.
//!
//! # Module Organization
//!
//! - `params`: construction and search parameters
//! - `layer`: per-layer adjacency lists over dense handles
//! - `graph`: the layered graph (insert, layer search, neighbor selection,
//!   tombstones, compaction)
//! - `index`: the public [`HnswIndex`] mapping external ids to handles

mod graph;
mod index;
mod layer;
mod params;


pub use index::HnswIndex;
pub use layer::NodeId;
pub use params::HnswParams;

pub(crate) use index::HnswIndexSnapshot;
