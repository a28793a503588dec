//! In-memory storage backend.
//!
//! Records live in an insertion-ordered map, giving `list_ids` a stable
//! order within a run. Page cursors address a snapshot of the key order
//! taken when the first page is requested, so a pagination in progress is
//! unaffected by concurrent mutation.

use crate::error::{Error, Result};
use crate::record::Metadata;
use crate::storage::paging::{check_page_size, Cursor, IdPage};
use crate::storage::traits::{StorageStats, VectorStorage};

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum number of pagination snapshots retained at once. The oldest
/// snapshot is evicted when the cap is exceeded; its cursor then reads as
/// expired.
const MAX_SNAPSHOTS: usize = 32;

#[derive(Debug, Clone)]
struct StoredRecord {
    vector: Vec<f32>,
    metadata: Option<Metadata>,
}

/// In-memory storage backend.
#[derive(Debug)]
pub struct MemoryStorage {
    records: RwLock<IndexMap<String, StoredRecord>>,
    /// Pagination snapshots: generation -> frozen key order.
    snapshots: RwLock<FxHashMap<u64, Arc<Vec<String>>>>,
    next_generation: AtomicU64,
    closed: bool,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(IndexMap::new()),
            snapshots: RwLock::new(FxHashMap::default()),
            next_generation: AtomicU64::new(1),
            closed: false,
        }
    }

    fn take_snapshot(&self) -> (u64, Arc<Vec<String>>) {
        let keys: Arc<Vec<String>> =
            Arc::new(self.records.read().keys().cloned().collect::<Vec<_>>());
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut snapshots = self.snapshots.write();
        if snapshots.len() >= MAX_SNAPSHOTS {
            if let Some(oldest) = snapshots.keys().min().copied() {
                snapshots.remove(&oldest);
            }
        }
        snapshots.insert(generation, Arc::clone(&keys));
        (generation, keys)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStorage for MemoryStorage {
    fn store(&mut self, id: &str, vector: &[f32], metadata: Option<&Metadata>) -> Result<()> {
        self.records.write().insert(
            id.to_string(),
            StoredRecord {
                vector: vector.to_vec(),
                metadata: metadata.cloned(),
            },
        );
        Ok(())
    }

    fn retrieve(&self, id: &str) -> Result<Option<(Vec<f32>, Option<Metadata>)>> {
        Ok(self
            .records
            .read()
            .get(id)
            .map(|r| (r.vector.clone(), r.metadata.clone())))
    }

    fn retrieve_metadata(&self, id: &str) -> Result<Option<Metadata>> {
        Ok(self.records.read().get(id).and_then(|r| r.metadata.clone()))
    }

    fn delete(&mut self, ids: &[String]) -> Result<usize> {
        let mut records = self.records.write();
        let mut removed = 0;
        for id in ids {
            // shift_remove keeps the enumeration order of the survivors
            if records.shift_remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn update_metadata(&mut self, id: &str, metadata: Metadata) -> Result<()> {
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(record) => {
                record.metadata = Some(metadata);
                Ok(())
            }
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }

    fn list_ids(&self, limit: Option<usize>) -> Vec<String> {
        let records = self.records.read();
        let take = limit.unwrap_or(usize::MAX);
        records.keys().take(take).cloned().collect()
    }

    fn list_ids_paged(&self, page_size: usize, cursor: Option<&str>) -> Result<IdPage> {
        check_page_size(page_size)?;

        let (generation, keys, offset) = match cursor {
            None => {
                let (generation, keys) = self.take_snapshot();
                (generation, keys, 0usize)
            }
            Some(token) => {
                let cursor = Cursor::decode(token)?;
                let keys = self
                    .snapshots
                    .read()
                    .get(&cursor.generation)
                    .cloned()
                    .ok_or_else(|| {
                        Error::InvalidInput(format!("unknown or expired cursor '{token}'"))
                    })?;
                let offset = usize::try_from(cursor.position)
                    .map_err(|_| Error::InvalidInput(format!("malformed cursor '{token}'")))?;
                (cursor.generation, keys, offset)
            }
        };

        let end = keys.len().min(offset.saturating_add(page_size));
        let items = keys[offset.min(keys.len())..end].to_vec();
        let has_more = end < keys.len();

        if has_more {
            Ok(IdPage {
                items,
                next_cursor: Some(
                    Cursor {
                        generation,
                        position: end as u64,
                    }
                    .encode(),
                ),
                has_more: true,
            })
        } else {
            // Pagination finished; drop the snapshot.
            self.snapshots.write().remove(&generation);
            Ok(IdPage {
                items,
                next_cursor: None,
                has_more: false,
            })
        }
    }

    fn stream_ids(&self) -> Box<dyn Iterator<Item = String> + Send> {
        let keys: Vec<String> = self.records.read().keys().cloned().collect();
        Box::new(keys.into_iter())
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }

    fn dimensions(&self) -> Option<usize> {
        self.records.read().first().map(|(_, r)| r.vector.len())
    }

    fn stats(&self) -> StorageStats {
        StorageStats {
            backend: "MemoryStorage".to_string(),
            vector_count: self.len(),
            dimensions: self.dimensions(),
            disk_bytes: None,
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.records.write().clear();
            self.snapshots.write().clear();
            self.closed = true;
        }
        Ok(())
    }
}
