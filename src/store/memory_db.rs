//! In-memory key-value store.

use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;

use super::{DbError, KeyValueStore, Result};

/// Type alias for our fast HashMap with FxHash.
type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// Thread-safe in-memory store.
///
/// Readers share a `parking_lot::RwLock`; writers take it exclusively.
/// After `close()` every operation fails with `DbError::Closed`, which is
/// how callers observe storage failures without a real disk.
pub struct MemoryDb {
    data: RwLock<FastHashMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryDb {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(FastHashMap::with_hasher(FxBuildHasher)),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Counts the entries whose key starts with `prefix`.
    pub fn count_prefix(&self, prefix: &[u8]) -> usize {
        self.data.read().keys().filter(|k| k.starts_with(prefix)).count()
    }

    /// Closes the store. Subsequent operations fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns true once `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(DbError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        self.data.write().remove(key);
        Ok(())
    }
}
