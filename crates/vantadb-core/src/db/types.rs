//! Database struct, lifecycle states, and aggregated statistics.

use crate::config::DatabaseOptions;
use crate::error::{Error, Result};
use crate::index::{Index, IndexStats, VectorIndex};
use crate::quantize::{AnyQuantizer, Quantizer, QuantizerStats};
use crate::storage::{Storage, StorageStats, VectorStorage};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lifecycle state of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseState {
    /// Constructed but not yet initialized.
    Created,
    /// Initialized and serving reads and writes.
    Ready,
    /// A two-phase write compensation failed; reads continue, writes are
    /// rejected until a fresh coordinator is constructed from storage.
    Degraded,
    /// Closed; all operations fail.
    Closed,
}

/// Aggregated statistics across storage, index, and quantizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    /// Current lifecycle state.
    pub state: DatabaseState,
    /// Database dimension, `None` until the first insert fixes it.
    pub dimensions: Option<usize>,
    /// Number of live vectors.
    pub vector_count: usize,
    /// Storage backend statistics.
    pub storage: StorageStats,
    /// Index statistics.
    pub index: IndexStats,
    /// Quantizer statistics, when quantization is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<QuantizerStats>,
}

/// A coordinated vector database: one storage backend, one index, and an
/// optional quantizer behind a single thread-safe client.
///
/// Reads run in parallel; writes are serialized against each other and may
/// run concurrently with reads. Within a single caller's view operations
/// are linearizable: a completed insert is visible to that caller's
/// subsequent search.
#[derive(Debug)]
pub struct Database {
    pub(super) options: DatabaseOptions,
    pub(super) state: RwLock<DatabaseState>,
    pub(super) storage: RwLock<Storage>,
    pub(super) index: Index,
    pub(super) quantizer: Option<RwLock<AnyQuantizer>>,
    /// Database dimension; 0 until fixed by the first successful insert.
    pub(super) dimensions: AtomicUsize,
    /// Serializes insert/update/delete against each other.
    pub(super) write_lock: Mutex<()>,
}

impl Database {
    /// The creation options this database was built from.
    #[must_use]
    pub const fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DatabaseState {
        *self.state.read()
    }

    /// Database dimension, `None` until the first insert fixes it.
    #[must_use]
    pub fn dimensions(&self) -> Option<usize> {
        match self.dimensions.load(Ordering::Relaxed) {
            0 => None,
            d => Some(d),
        }
    }

    /// Aggregates statistics from storage, index, and quantizer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` before `initialize` or after `close`.
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        self.check_readable()?;
        let storage = self.storage.read().stats();
        let index = self.index.stats();
        Ok(DatabaseStats {
            state: self.state(),
            dimensions: self.dimensions(),
            vector_count: storage.vector_count,
            storage,
            index,
            quantization: self.quantizer.as_ref().map(|q| q.read().stats()),
        })
    }

    /// Fails unless the database serves reads (Ready or Degraded).
    pub(super) fn check_readable(&self) -> Result<()> {
        match self.state() {
            DatabaseState::Ready | DatabaseState::Degraded => Ok(()),
            DatabaseState::Created => Err(Error::InvalidState(
                "database is not initialized".to_string(),
            )),
            DatabaseState::Closed => Err(Error::InvalidState("database is closed".to_string())),
        }
    }

    /// Fails unless the database accepts writes (Ready only).
    pub(super) fn check_writable(&self) -> Result<()> {
        match self.state() {
            DatabaseState::Ready => Ok(()),
            DatabaseState::Degraded => Err(Error::InvalidState(
                "database is degraded; writes are rejected".to_string(),
            )),
            DatabaseState::Created => Err(Error::InvalidState(
                "database is not initialized".to_string(),
            )),
            DatabaseState::Closed => Err(Error::InvalidState("database is closed".to_string())),
        }
    }

    /// Marks the database degraded after a failed compensation.
    pub(super) fn mark_degraded(&self) {
        *self.state.write() = DatabaseState::Degraded;
    }
}
