//! # `VantaDB` Core
//!
//! Embeddable vector database engine written in Rust.
//!
//! `VantaDB` indexes high-dimensional vectors with optional JSON metadata and
//! serves approximate (HNSW) or exact (flat scan) k-nearest-neighbor queries
//! under a variety of distance metrics. A single [`Database`] binds one
//! storage backend, one index, and an optional quantizer.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vantadb_core::{Database, DatabaseOptions, DistanceMetric};
//!
//! // Create an in-memory database with an HNSW index
//! let db = Database::new(DatabaseOptions::default())?;
//! db.initialize()?;
//!
//! // Insert vectors; ids are generated when not supplied
//! let ids = db.insert(vec![vec![0.1, 0.2, 0.3]], None)?;
//!
//! // Search for the 10 nearest neighbors
//! let results = db.search(&[0.1, 0.2, 0.3], 10)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod distance;
pub mod error;
pub mod index;
pub mod persistence;
pub mod quantize;
pub mod record;
pub mod storage;

pub use config::{DatabaseOptions, IndexConfig, QuantizerConfig, Settings, StorageConfig};
pub use db::{Database, DatabaseState, DatabaseStats};
pub use distance::DistanceMetric;
pub use error::{Error, ErrorKind, Result};
pub use index::{FlatIndex, HnswIndex, HnswParams, Index, IndexStats, VectorIndex};
pub use persistence::{SnapshotReader, SnapshotWriter};
pub use quantize::{AnyQuantizer, ProductQuantizer, Quantizer, ScalarQuantizer};
pub use record::{Metadata, SearchMatch, VectorRecord};
pub use storage::{DiskStorage, IdPage, MemoryStorage, Storage, StorageStats, VectorStorage};

/// Maximum number of results a single search may request.
pub const MAX_K: usize = 4096;

/// Maximum page size accepted by paged id enumeration.
pub const MAX_PAGE: usize = 10_000;
