//! Insert, update, and delete with the two-phase write protocol.
//!
//! Every write validates first (all-or-nothing for a batch), then writes to
//! storage, then registers with the index. A failed registration is
//! compensated by deleting the storage write; a failed compensation marks
//! the database `Degraded` and the surfaced error reports both causes.

use crate::db::ids::{check_batch_unique, generate_id, validate_id};
use crate::db::types::Database;
use crate::error::{Error, Result};
use crate::index::{check_vector, VectorIndex};
use crate::quantize::Quantizer;
use crate::record::{Metadata, VectorRecord};
use crate::storage::VectorStorage;

use std::sync::atomic::Ordering;
use tracing::{error, warn};

impl Database {
    /// Inserts a batch of vectors with optional parallel metadata, returning
    /// one generated id per vector in input order.
    ///
    /// Validation is all-or-nothing: no record is written unless the whole
    /// batch validates.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for malformed vectors or a metadata length
    /// mismatch, `InvalidState` for an untrained quantizer, and storage or
    /// index errors from the write path.
    pub fn insert(
        &self,
        vectors: Vec<Vec<f32>>,
        metadata: Option<Vec<Option<Metadata>>>,
    ) -> Result<Vec<String>> {
        let records = match metadata {
            None => vectors
                .into_iter()
                .map(|vector| VectorRecord::unassigned(vector, None))
                .collect(),
            Some(metadata) => {
                if metadata.len() != vectors.len() {
                    return Err(Error::InvalidInput(format!(
                        "metadata length {} does not match vector count {}",
                        metadata.len(),
                        vectors.len()
                    )));
                }
                vectors
                    .into_iter()
                    .zip(metadata)
                    .map(|(vector, metadata)| VectorRecord::unassigned(vector, metadata))
                    .collect()
            }
        };
        self.insert_records(records)
    }

    /// Inserts interchange records, honoring caller-supplied ids and
    /// generating the rest. This is the import entry point.
    ///
    /// # Errors
    ///
    /// As [`Database::insert`], plus `Conflict` for duplicate ids within
    /// the batch.
    pub fn insert_records(&self, records: Vec<VectorRecord>) -> Result<Vec<String>> {
        self.check_writable()?;
        let _write = self.write_lock.lock();
        if records.is_empty() {
            return Ok(Vec::new());
        }

        // All-or-nothing validation: vectors first, against the stored
        // dimension or the batch's own first vector.
        let expected = self
            .dimensions()
            .or_else(|| records.first().map(VectorRecord::dimension));
        for record in &records {
            check_vector(&record.vector, expected)?;
        }

        let ids = records
            .iter()
            .map(|record| match &record.id {
                Some(id) => {
                    validate_id(id)?;
                    Ok(id.clone())
                }
                None => Ok(generate_id()),
            })
            .collect::<Result<Vec<String>>>()?;
        check_batch_unique(&ids)?;

        if let Some(quantizer) = &self.quantizer {
            if !quantizer.read().is_trained() {
                return Err(Error::InvalidState(
                    "quantizer must be trained before inserts".to_string(),
                ));
            }
        }

        for (id, record) in ids.iter().zip(&records) {
            self.write_record(id, &record.vector, record.metadata.as_ref(), "insert")?;
        }
        Ok(ids)
    }

    /// Updates the vector and/or metadata of an existing record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an absent id, `InvalidInput` when neither a
    /// vector nor metadata is supplied.
    pub fn update(
        &self,
        id: &str,
        vector: Option<&[f32]>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        self.check_writable()?;
        let _write = self.write_lock.lock();
        self.update_locked(id, vector, metadata)
    }

    /// Updates parallel sequences of records, returning one success flag
    /// per entry. A `Degraded` failure aborts the batch.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the sequences disagree on length.
    pub fn batch_update(
        &self,
        ids: &[String],
        vectors: &[Option<Vec<f32>>],
        metadatas: &[Option<Metadata>],
    ) -> Result<Vec<bool>> {
        self.check_writable()?;
        if ids.len() != vectors.len() || ids.len() != metadatas.len() {
            return Err(Error::InvalidInput(format!(
                "batch_update sequences disagree on length: {} ids, {} vectors, {} metadatas",
                ids.len(),
                vectors.len(),
                metadatas.len()
            )));
        }

        let _write = self.write_lock.lock();
        let mut outcomes = Vec::with_capacity(ids.len());
        for ((id, vector), metadata) in ids.iter().zip(vectors).zip(metadatas) {
            match self.update_locked(id, vector.as_deref(), metadata.clone()) {
                Ok(()) => outcomes.push(true),
                Err(e @ Error::Degraded { .. }) => return Err(e),
                Err(e) => {
                    warn!(id, error = %e, "batch update entry failed");
                    outcomes.push(false);
                }
            }
        }
        Ok(outcomes)
    }

    /// Deletes records; missing ids do not fail the batch. Returns the
    /// number of records removed from storage.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the delete path.
    pub fn delete(&self, ids: &[String]) -> Result<usize> {
        self.check_writable()?;
        let _write = self.write_lock.lock();

        // Index first: a search issued during the delete must not surface
        // an id whose record is already gone from storage.
        for id in ids {
            self.index.remove(id);
        }
        self.storage
            .write()
            .delete(ids)
            .map_err(|e| e.during("delete"))
    }

    fn update_locked(
        &self,
        id: &str,
        vector: Option<&[f32]>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        if vector.is_none() && metadata.is_none() {
            return Err(Error::InvalidInput(
                "update requires a vector or metadata".to_string(),
            ));
        }
        validate_id(id)?;

        let previous = self
            .storage
            .read()
            .retrieve(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        match vector {
            Some(vector) => {
                check_vector(vector, self.dimensions())?;
                // Metadata is preserved when the caller leaves it unchanged.
                let metadata = metadata.or_else(|| previous.1.clone());
                let index_vector = self.vector_for_index(vector)?;

                self.storage
                    .write()
                    .store(id, vector, metadata.as_ref())
                    .map_err(|e| e.during("update"))?;

                if let Err(primary) = self.index.insert(id, &index_vector) {
                    return Err(self.compensate_update(id, &previous, &primary));
                }
                Ok(())
            }
            None => {
                let metadata = metadata.unwrap_or_default();
                self.storage
                    .write()
                    .update_metadata(id, metadata)
                    .map_err(|e| e.during("update"))
            }
        }
    }

    /// Restores the pre-update record after a failed index registration.
    ///
    /// The index retires the old handle only after the replacement links,
    /// so a failed registration leaves it still answering for the previous
    /// vector; restoring the storage row completes the compensation.
    fn compensate_update(
        &self,
        id: &str,
        previous: &(Vec<f32>, Option<Metadata>),
        primary: &Error,
    ) -> Error {
        warn!(id, error = %primary, "index registration failed; restoring previous record");
        match self
            .storage
            .write()
            .store(id, &previous.0, previous.1.as_ref())
        {
            Ok(()) => Error::Index(format!("update: {primary}")),
            Err(compensation) => {
                self.mark_degraded();
                error!(id, %primary, %compensation, "compensation failed; database degraded");
                Error::Degraded {
                    operation: "update".to_string(),
                    primary: primary.to_string(),
                    compensation: compensation.to_string(),
                }
            }
        }
    }

    /// The two-phase write for one record: storage, then index, with
    /// compensation on registration failure.
    fn write_record(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Option<&Metadata>,
        operation: &str,
    ) -> Result<()> {
        let index_vector = self.vector_for_index(vector)?;

        self.storage
            .write()
            .store(id, vector, metadata)
            .map_err(|e| e.during(operation))?;

        if let Err(primary) = self.index.insert(id, &index_vector) {
            warn!(id, error = %primary, "index registration failed; compensating storage write");
            return match self.storage.write().delete(&[id.to_string()]) {
                Ok(_) => Err(primary.during(operation)),
                Err(compensation) => {
                    self.mark_degraded();
                    error!(id, %primary, %compensation, "compensation failed; database degraded");
                    Err(Error::Degraded {
                        operation: operation.to_string(),
                        primary: primary.to_string(),
                        compensation: compensation.to_string(),
                    })
                }
            };
        }

        if self.dimensions.load(Ordering::Relaxed) == 0 {
            self.dimensions.store(vector.len(), Ordering::Relaxed);
        }
        Ok(())
    }
}
