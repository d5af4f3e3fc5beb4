//! Prefixed views over a shared store.

use super::{KeyValueStore, Result, SharedStore};

/// A key-prefix namespace inside another store.
///
/// Every key is transparently prefixed on the way in, so two tables with
/// disjoint prefixes can share the same backing store.
#[derive(Clone)]
pub struct Table {
    db: SharedStore,
    prefix: Vec<u8>,
}

impl Table {
    /// Creates a table over `db` with the given prefix.
    pub fn new(db: SharedStore, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            db,
            prefix: prefix.into(),
        }
    }

    /// Returns the table prefix.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn prefixed(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}

impl KeyValueStore for Table {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get(&self.prefixed(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(&self.prefixed(key), value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(&self.prefixed(key))
    }
}
