//! The coordinated vector-database client.
//!
//! [`Database`] binds one storage backend and one index, orders mutations
//! across them (storage write precedes index registration, with explicit
//! compensation), assigns identities, and exposes the query surface.
//!
//! # Module Structure
//!
//! - `types`: the `Database` struct, lifecycle states, and stats
//! - `lifecycle`: construction, `initialize`, `close`, dimension discovery
//! - `crud`: insert/update/delete with the two-phase write protocol
//! - `search`: single and batched k-NN queries
//! - `enumerate`: id listing, paging, and streaming
//! - `ids`: id validation and generation

mod crud;
mod enumerate;
mod ids;
mod lifecycle;
mod search;
mod types;


pub use types::{Database, DatabaseState, DatabaseStats};
