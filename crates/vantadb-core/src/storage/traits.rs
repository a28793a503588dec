//! Storage backend contract.

use crate::error::Result;
use crate::record::Metadata;
use crate::storage::paging::IdPage;
use serde::{Deserialize, Serialize};

/// Statistics reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Backend type name (e.g., "MemoryStorage").
    pub backend: String,
    /// Number of stored records.
    pub vector_count: usize,
    /// Vector dimension, if known.
    pub dimensions: Option<usize>,
    /// Bytes occupied on disk, for disk-resident backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_bytes: Option<u64>,
}

/// Durable mapping from id to `(vector, metadata)` with enumeration support.
///
/// Backends provide their own synchronization for reads; mutations take
/// `&mut self` and are serialized by the coordinator.
pub trait VectorStorage: Send + Sync {
    /// Stores a record, overwriting any existing record with the same id.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` or `Io` error if the write fails.
    fn store(&mut self, id: &str, vector: &[f32], metadata: Option<&Metadata>) -> Result<()>;

    /// Retrieves a record by id, or `None` on a miss.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` or `Io` error if the read fails.
    fn retrieve(&self, id: &str) -> Result<Option<(Vec<f32>, Option<Metadata>)>>;

    /// Retrieves only the metadata for an id, or `None` on a miss or when
    /// the record has no metadata.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` or `Io` error if the read fails.
    fn retrieve_metadata(&self, id: &str) -> Result<Option<Metadata>>;

    /// Deletes records; missing ids are tolerated. Returns the number of
    /// records actually removed.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` or `Io` error if the write fails.
    fn delete(&mut self, ids: &[String]) -> Result<usize>;

    /// Replaces the metadata of an existing record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is absent.
    fn update_metadata(&mut self, id: &str, metadata: Metadata) -> Result<()>;

    /// Returns true if the id is present.
    fn contains(&self, id: &str) -> bool;

    /// Lists ids in an order that is stable within a run.
    fn list_ids(&self, limit: Option<usize>) -> Vec<String>;

    /// Lists one page of ids. Cursors are opaque tokens produced here and
    /// passed back verbatim.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero or oversized page size, or a
    /// malformed/expired cursor.
    fn list_ids_paged(&self, page_size: usize, cursor: Option<&str>) -> Result<IdPage>;

    /// Returns a lazy, finite, non-restartable sequence of ids.
    fn stream_ids(&self) -> Box<dyn Iterator<Item = String> + Send>;

    /// Number of stored records.
    fn len(&self) -> usize;

    /// Returns true if no records are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension, if any record has been stored.
    fn dimensions(&self) -> Option<usize>;

    /// Backend statistics.
    fn stats(&self) -> StorageStats;

    /// Flushes buffered state to durable media.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the flush fails.
    fn flush(&mut self) -> Result<()>;

    /// Flushes and releases resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the final flush fails.
    fn close(&mut self) -> Result<()>;
}
