//! k-NN queries over the coordinated database.

use crate::db::types::Database;
use crate::error::{Error, Result};
use crate::index::{check_vector, VectorIndex};
use crate::record::SearchMatch;
use crate::storage::VectorStorage;
use crate::MAX_K;

impl Database {
    /// Returns up to `k` matches sorted by ascending distance, with
    /// metadata hydrated from storage. Never mutates state; always safe to
    /// retry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for `k` outside `[1, MAX_K]` or a malformed
    /// query, `InvalidState` before `initialize` or after `close`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchMatch>> {
        self.check_readable()?;
        if k == 0 || k > MAX_K {
            return Err(Error::InvalidInput(format!(
                "k {k} is out of range [1, {MAX_K}]"
            )));
        }
        check_vector(query, self.dimensions())?;

        let hits = self.index.search(query, k)?;
        let storage = self.storage.read();
        let mut matches = Vec::with_capacity(hits.len());
        for (id, distance) in hits {
            let metadata = storage.retrieve_metadata(&id)?;
            matches.push(SearchMatch::new(id, distance, metadata));
        }
        Ok(matches)
    }

    /// Runs one search per query, preserving input order. Equivalent to
    /// calling [`Database::search`] per query.
    ///
    /// # Errors
    ///
    /// As [`Database::search`]; the first failing query aborts the batch.
    pub fn batch_search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<SearchMatch>>> {
        queries.iter().map(|query| self.search(query, k)).collect()
    }
}
