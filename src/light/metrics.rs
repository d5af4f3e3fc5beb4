//! Indexer metrics for observability.
//!
//! Tracks statistics about section builds for monitoring and debugging.

use std::sync::atomic::{AtomicU64, Ordering};

/// Indexer metrics container.
///
/// All counters are atomic so the CHT and bloom trie backends can share one
/// container across threads.
#[derive(Debug, Default)]
pub struct IndexerMetrics {
    /// Number of sections whose root was persisted.
    pub sections_committed: AtomicU64,
    /// Number of section commits that failed.
    pub sections_aborted: AtomicU64,
    /// Number of trie leaves inserted or updated.
    pub leaves_written: AtomicU64,
    /// Number of trie leaves deleted (empty bloom columns).
    pub leaves_deleted: AtomicU64,
    /// Total compressed bloom column bytes.
    pub compressed_bytes: AtomicU64,
    /// Total decompressed bloom column bytes.
    pub decompressed_bytes: AtomicU64,
}

impl IndexerMetrics {
    /// Creates a new metrics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the committed section counter.
    pub fn inc_sections_committed(&self) {
        self.sections_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the aborted section counter.
    pub fn inc_sections_aborted(&self) {
        self.sections_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to the written leaves counter.
    pub fn add_leaves_written(&self, count: u64) {
        self.leaves_written.fetch_add(count, Ordering::Relaxed);
    }

    /// Adds to the deleted leaves counter.
    pub fn add_leaves_deleted(&self, count: u64) {
        self.leaves_deleted.fetch_add(count, Ordering::Relaxed);
    }

    /// Records the sizes of one section's bloom columns.
    pub fn add_bloom_bytes(&self, compressed: u64, decompressed: u64) {
        self.compressed_bytes.fetch_add(compressed, Ordering::Relaxed);
        self.decompressed_bytes.fetch_add(decompressed, Ordering::Relaxed);
    }

    /// Returns a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sections_committed: self.sections_committed.load(Ordering::Relaxed),
            sections_aborted: self.sections_aborted.load(Ordering::Relaxed),
            leaves_written: self.leaves_written.load(Ordering::Relaxed),
            leaves_deleted: self.leaves_deleted.load(Ordering::Relaxed),
            compressed_bytes: self.compressed_bytes.load(Ordering::Relaxed),
            decompressed_bytes: self.decompressed_bytes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of metrics values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sections_committed: u64,
    pub sections_aborted: u64,
    pub leaves_written: u64,
    pub leaves_deleted: u64,
    pub compressed_bytes: u64,
    pub decompressed_bytes: u64,
}

impl MetricsSnapshot {
    /// Calculates the difference between two snapshots.
    pub fn diff(&self, other: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            sections_committed: self.sections_committed.saturating_sub(other.sections_committed),
            sections_aborted: self.sections_aborted.saturating_sub(other.sections_aborted),
            leaves_written: self.leaves_written.saturating_sub(other.leaves_written),
            leaves_deleted: self.leaves_deleted.saturating_sub(other.leaves_deleted),
            compressed_bytes: self.compressed_bytes.saturating_sub(other.compressed_bytes),
            decompressed_bytes: self.decompressed_bytes.saturating_sub(other.decompressed_bytes),
        }
    }

    /// Returns the bloom compression ratio (compressed / decompressed).
    pub fn compression_ratio(&self) -> f64 {
        compression_ratio(self.compressed_bytes, self.decompressed_bytes)
    }
}

/// Compressed over decompressed size; zero when nothing was decompressed.
pub(crate) fn compression_ratio(compressed: u64, decompressed: u64) -> f64 {
    if decompressed == 0 {
        0.0
    } else {
        compressed as f64 / decompressed as f64
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Indexer Metrics:")?;
        writeln!(f, "  Sections committed: {}", self.sections_committed)?;
        writeln!(f, "  Sections aborted:   {}", self.sections_aborted)?;
        writeln!(f, "  Leaves written:     {}", self.leaves_written)?;
        writeln!(f, "  Leaves deleted:     {}", self.leaves_deleted)?;
        writeln!(
            f,
            "  Bloom compression:  {} / {} bytes ({:.1}%)",
            self.compressed_bytes,
            self.decompressed_bytes,
            self.compression_ratio() * 100.0
        )?;
        Ok(())
    }
}
