//! Database lifecycle: construction, initialization, close.

use crate::config::{DatabaseOptions, IndexConfig};
use crate::db::types::{Database, DatabaseState};
use crate::error::{Error, Result};
use crate::index::hnsw::HnswIndexSnapshot;
use crate::index::{HnswIndex, HnswParams, Index, VectorIndex};
use crate::quantize::{AnyQuantizer, Quantizer};
use crate::record::VectorRecord;
use crate::storage::{Storage, VectorStorage};

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

impl Database {
    /// Constructs a database from creation options. The storage backend is
    /// opened (recovering any existing records for the disk variant) but
    /// the database stays in `Created` until [`Database::initialize`].
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for invalid options and a `Storage`/`Io`
    /// error if the backend cannot be opened.
    pub fn new(options: DatabaseOptions) -> Result<Self> {
        options.validate()?;
        let storage = Storage::from_config(&options.storage)?;
        let index = Index::from_config(&options.index, options.metric, options.dimensions);
        let quantizer = options
            .quantizer
            .as_ref()
            .map(|config| RwLock::new(AnyQuantizer::from_config(config)));

        Ok(Self {
            dimensions: AtomicUsize::new(options.dimensions.unwrap_or(0)),
            options,
            state: RwLock::new(DatabaseState::Created),
            storage: RwLock::new(storage),
            index,
            quantizer,
            write_lock: Mutex::new(()),
        })
    }

    /// Initializes the database: discovers the dimension, rebuilds the
    /// index from storage when the backend recovered records, and
    /// transitions to `Ready`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` after `close`, `InconsistentState` when the
    /// store is non-empty but no dimension can be inferred.
    pub fn initialize(&self) -> Result<()> {
        match self.state() {
            DatabaseState::Ready | DatabaseState::Degraded => return Ok(()),
            DatabaseState::Closed => {
                return Err(Error::InvalidState(
                    "database is closed; construct a new one".to_string(),
                ))
            }
            DatabaseState::Created => {}
        }

        let dimensions = self.discover_dimensions()?;
        if dimensions > 0 {
            self.dimensions.store(dimensions, Ordering::Relaxed);
        }

        self.rebuild_index_from_storage()?;

        *self.state.write() = DatabaseState::Ready;
        info!(
            dimensions,
            vector_count = self.storage.read().len(),
            "database initialized"
        );
        Ok(())
    }

    /// Flushes storage, releases the index, and transitions to `Closed`.
    /// Idempotent; subsequent operations fail with `InvalidState`.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the final flush fails; the database still
    /// transitions to `Closed`.
    pub fn close(&self) -> Result<()> {
        let _write = self.write_lock.lock();
        if self.state() == DatabaseState::Closed {
            return Ok(());
        }

        let result = self.storage.write().close();
        if let Some(quantizer) = &self.quantizer {
            quantizer.write().close();
        }
        *self.state.write() = DatabaseState::Closed;
        debug!("database closed");
        result
    }

    /// Trains the configured quantizer from a sample. Must run before the
    /// first insert when quantization is enabled.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error when no quantizer is configured, or the
    /// quantizer's own training error.
    pub fn train_quantizer(&self, samples: &[Vec<f32>]) -> Result<()> {
        self.check_writable()?;
        let Some(quantizer) = &self.quantizer else {
            return Err(Error::Config("no quantizer configured".to_string()));
        };
        quantizer.write().train(samples)
    }

    /// Resolves the expected dimension, in order: explicit options, index
    /// stats, nested (quantizer) stats, the first stored record, or 0 for
    /// an empty store.
    fn discover_dimensions(&self) -> Result<usize> {
        if let Some(dimensions) = self.options.dimensions {
            return Ok(dimensions);
        }
        if let Some(dimensions) = self.index.stats().dimensions {
            return Ok(dimensions);
        }
        if let Some(quantizer) = &self.quantizer {
            if let Some(dimensions) = quantizer.read().dimensions() {
                return Ok(dimensions);
            }
        }

        let storage = self.storage.read();
        if let Some(dimensions) = storage.dimensions() {
            return Ok(dimensions);
        }
        if storage.is_empty() {
            return Ok(0);
        }
        Err(Error::InconsistentState(
            "store is non-empty but no dimension can be inferred".to_string(),
        ))
    }

    /// Re-registers every stored record with the index. The graph is not
    /// persisted outside snapshots, so a freshly opened disk database
    /// rebuilds it here.
    fn rebuild_index_from_storage(&self) -> Result<()> {
        let storage = self.storage.read();
        if storage.is_empty() || !self.index.is_empty() {
            return Ok(());
        }

        // A restarted database has no quantizer state until a snapshot
        // restores it or the embedder retrains; rebuild with exact vectors
        // in that window rather than refusing to come up.
        let quantize = self
            .quantizer
            .as_ref()
            .is_some_and(|q| q.read().is_trained());
        if self.quantizer.is_some() && !quantize {
            warn!("quantizer is untrained; rebuilding index from exact vectors");
        }

        let mut rebuilt = 0usize;
        for id in storage.stream_ids() {
            match storage.retrieve(&id)? {
                Some((vector, _)) => {
                    let vector = if quantize {
                        self.vector_for_index(&vector)?
                    } else {
                        vector
                    };
                    self.index.insert(&id, &vector).map_err(|e| e.during("rebuild"))?;
                    rebuilt += 1;
                }
                None => warn!(id, "id listed but missing during index rebuild"),
            }
        }
        if rebuilt > 0 {
            debug!(rebuilt, "index rebuilt from storage");
        }
        Ok(())
    }

    /// A clone of the quantizer state, for snapshots.
    pub(crate) fn quantizer_state(&self) -> Option<AnyQuantizer> {
        self.quantizer.as_ref().map(|q| q.read().clone())
    }

    /// A serializable image of the HNSW graph, when the index is HNSW.
    pub(crate) fn hnsw_snapshot(&self) -> Option<HnswIndexSnapshot> {
        match &self.index {
            Index::Hnsw(index) => Some(index.snapshot()),
            Index::Flat(_) => None,
        }
    }

    /// Reassembles a database from snapshot parts. The result is in
    /// `Created` state; `initialize` completes the restore (and rebuilds
    /// the index from storage when no graph image was captured).
    pub(crate) fn restore_parts(
        options: DatabaseOptions,
        records: Vec<VectorRecord>,
        quantizer: Option<AnyQuantizer>,
        graph: Option<HnswIndexSnapshot>,
    ) -> Result<Self> {
        options.validate()?;
        let mut storage = Storage::from_config(&options.storage)?;
        for record in &records {
            let id = record.id.as_deref().ok_or_else(|| {
                Error::Persistence("snapshot record is missing its id".to_string())
            })?;
            storage
                .store(id, &record.vector, record.metadata.as_ref())
                .map_err(|e| e.during("restore"))?;
        }

        let index = match (&options.index, graph) {
            (
                IndexConfig::Hnsw {
                    m,
                    ef_construction,
                    ef_search,
                },
                Some(snapshot),
            ) => Index::Hnsw(HnswIndex::from_parts(
                options.metric,
                HnswParams::new(*m, *ef_construction, *ef_search),
                snapshot,
            )?),
            (config, _) => Index::from_config(config, options.metric, options.dimensions),
        };

        let quantizer = match (&options.quantizer, quantizer) {
            (Some(_), Some(state)) => Some(RwLock::new(state)),
            (Some(config), None) => Some(RwLock::new(AnyQuantizer::from_config(config))),
            (None, _) => None,
        };

        Ok(Self {
            dimensions: AtomicUsize::new(options.dimensions.unwrap_or(0)),
            options,
            state: RwLock::new(DatabaseState::Created),
            storage: RwLock::new(storage),
            index,
            quantizer,
            write_lock: Mutex::new(()),
        })
    }

    /// The vector registered with the index: the quantizer-reconstructed
    /// form when quantization is enabled, the exact vector otherwise.
    pub(super) fn vector_for_index(&self, vector: &[f32]) -> Result<Vec<f32>> {
        match &self.quantizer {
            None => Ok(vector.to_vec()),
            Some(quantizer) => {
                let quantizer = quantizer.read();
                if !quantizer.is_trained() {
                    return Err(Error::InvalidState(
                        "quantizer must be trained before inserts".to_string(),
                    ));
                }
                let code = quantizer.encode(vector)?;
                quantizer.decode(&code)
            }
        }
    }
}
