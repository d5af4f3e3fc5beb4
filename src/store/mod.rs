//! Key-value storage used by the helper-trie indexers.
//!
//! The indexers only need a flat byte-keyed store. `MemoryDb` is the
//! in-process implementation; `Table` gives each index its own key-prefix
//! namespace on top of any store so that concurrently running indexers never
//! touch each other's entries.

mod memory_db;
mod table;

use std::sync::Arc;

use thiserror::Error;

pub use memory_db::MemoryDb;
pub use table::Table;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database is closed")]
    Closed,
    #[error("Database is corrupted: {0}")]
    Corrupted(String),
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// A byte-keyed store.
///
/// Implementations use interior mutability so one store can be shared by
/// several indexers through an `Arc`.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value. A missing key is `Ok(None)`, never an error.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Writes a value, replacing any previous one.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Returns true if the key is present.
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Shared handle to a store.
pub type SharedStore = Arc<dyn KeyValueStore>;
