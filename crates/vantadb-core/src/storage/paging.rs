//! Paged id enumeration types and cursor codec.
//!
//! A cursor is an opaque token (`v1:<generation>:<position>`) produced by a
//! backend and passed back verbatim by the caller. The in-memory backend uses
//! the generation to address a snapshot of its key order; the disk backend
//! uses only the position, interpreted against the on-disk ordering.

use crate::error::{Error, Result};
use crate::MAX_PAGE;
use serde::{Deserialize, Serialize};

/// One page of ids from [`crate::VectorStorage::list_ids_paged`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPage {
    /// Ids in this page.
    pub items: Vec<String>,
    /// Cursor for the next page, present iff `has_more`.
    pub next_cursor: Option<String>,
    /// Whether more pages remain.
    pub has_more: bool,
}

/// Decoded form of a cursor token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    /// Backend-defined generation (snapshot id for the memory backend).
    pub generation: u64,
    /// Position within the backend's ordering.
    pub position: u64,
}

impl Cursor {
    pub(crate) fn encode(self) -> String {
        format!("v1:{}:{}", self.generation, self.position)
    }

    pub(crate) fn decode(token: &str) -> Result<Self> {
        let mut parts = token.split(':');
        let (Some("v1"), Some(generation), Some(position), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidInput(format!("malformed cursor '{token}'")));
        };
        let generation = generation
            .parse::<u64>()
            .map_err(|_| Error::InvalidInput(format!("malformed cursor '{token}'")))?;
        let position = position
            .parse::<u64>()
            .map_err(|_| Error::InvalidInput(format!("malformed cursor '{token}'")))?;
        Ok(Self {
            generation,
            position,
        })
    }
}

/// Validates a requested page size against the paging contract.
pub(crate) fn check_page_size(page_size: usize) -> Result<()> {
    if page_size == 0 {
        return Err(Error::InvalidInput("page_size must be positive".to_string()));
    }
    if page_size > MAX_PAGE {
        return Err(Error::InvalidInput(format!(
            "page_size {page_size} exceeds maximum {MAX_PAGE}"
        )));
    }
    Ok(())
}
