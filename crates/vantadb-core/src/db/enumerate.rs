//! Id enumeration and record export.

use crate::db::types::Database;
use crate::error::Result;
use crate::record::VectorRecord;
use crate::storage::{IdPage, VectorStorage};

impl Database {
    /// Lists vector ids in an order stable within a run.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` before `initialize` or after `close`.
    pub fn list_vector_ids(&self, limit: Option<usize>) -> Result<Vec<String>> {
        self.check_readable()?;
        Ok(self.storage.read().list_ids(limit))
    }

    /// Lists one page of vector ids. Pass the returned cursor back verbatim
    /// to continue; concatenating pages until `has_more` is false yields
    /// every id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a bad page size or cursor, `InvalidState`
    /// before `initialize` or after `close`.
    pub fn list_vector_ids_paged(
        &self,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<IdPage> {
        self.check_readable()?;
        self.storage.read().list_ids_paged(page_size, cursor)
    }

    /// Returns a lazy, finite, non-restartable sequence of vector ids.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` before `initialize` or after `close`.
    pub fn stream_vector_ids(&self) -> Result<Box<dyn Iterator<Item = String> + Send>> {
        self.check_readable()?;
        Ok(self.storage.read().stream_ids())
    }

    /// Exports every record in interchange form, the counterpart of
    /// [`Database::insert_records`].
    ///
    /// # Errors
    ///
    /// Returns storage errors from the read path.
    pub fn export_records(&self) -> Result<Vec<VectorRecord>> {
        self.check_readable()?;
        let storage = self.storage.read();
        let mut records = Vec::with_capacity(storage.len());
        for id in storage.stream_ids() {
            if let Some((vector, metadata)) = storage.retrieve(&id)? {
                records.push(VectorRecord::new(id, vector, metadata));
            }
        }
        Ok(records)
    }
}
