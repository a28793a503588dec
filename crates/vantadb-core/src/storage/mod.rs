//! Storage backends for vector records.
//!
//! # Module Structure
//!
//! - [`traits`]: the [`VectorStorage`] contract and [`StorageStats`]
//! - [`memory`]: in-memory backend ([`MemoryStorage`])
//! - [`disk`]: disk-resident backend ([`DiskStorage`])
//! - [`paging`]: paged enumeration types and cursor codec

mod disk;
mod memory;
mod paging;
mod traits;
mod vector_bytes;

#[cfg(test)]
mod tests;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
pub use paging::IdPage;
pub use traits::{StorageStats, VectorStorage};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::record::Metadata;

/// Tagged storage backend held by the coordinator.
///
/// The set of backends is closed; open-world extension is not a goal of the
/// core, so dispatch is an enum rather than a trait object.
#[derive(Debug)]
pub enum Storage {
    /// In-memory backend.
    Memory(MemoryStorage),
    /// Disk-resident backend.
    Disk(DiskStorage),
}

impl Storage {
    /// Creates a backend from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an `Io` or `Storage` error if a disk backend cannot be opened.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config {
            StorageConfig::Memory => Ok(Self::Memory(MemoryStorage::new())),
            StorageConfig::Disk {
                data_dir,
                cache_size_mb,
            } => Ok(Self::Disk(DiskStorage::open(data_dir, *cache_size_mb)?)),
        }
    }

    fn inner(&self) -> &dyn VectorStorage {
        match self {
            Self::Memory(s) => s,
            Self::Disk(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn VectorStorage {
        match self {
            Self::Memory(s) => s,
            Self::Disk(s) => s,
        }
    }
}

impl VectorStorage for Storage {
    fn store(&mut self, id: &str, vector: &[f32], metadata: Option<&Metadata>) -> Result<()> {
        self.inner_mut().store(id, vector, metadata)
    }

    fn retrieve(&self, id: &str) -> Result<Option<(Vec<f32>, Option<Metadata>)>> {
        self.inner().retrieve(id)
    }

    fn retrieve_metadata(&self, id: &str) -> Result<Option<Metadata>> {
        self.inner().retrieve_metadata(id)
    }

    fn delete(&mut self, ids: &[String]) -> Result<usize> {
        self.inner_mut().delete(ids)
    }

    fn update_metadata(&mut self, id: &str, metadata: Metadata) -> Result<()> {
        self.inner_mut().update_metadata(id, metadata)
    }

    fn contains(&self, id: &str) -> bool {
        self.inner().contains(id)
    }

    fn list_ids(&self, limit: Option<usize>) -> Vec<String> {
        self.inner().list_ids(limit)
    }

    fn list_ids_paged(&self, page_size: usize, cursor: Option<&str>) -> Result<IdPage> {
        self.inner().list_ids_paged(page_size, cursor)
    }

    fn stream_ids(&self) -> Box<dyn Iterator<Item = String> + Send> {
        self.inner().stream_ids()
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn dimensions(&self) -> Option<usize> {
        self.inner().dimensions()
    }

    fn stats(&self) -> StorageStats {
        self.inner().stats()
    }

    fn flush(&mut self) -> Result<()> {
        self.inner_mut().flush()
    }

    fn close(&mut self) -> Result<()> {
        self.inner_mut().close()
    }
}
