//! Light-client helper tries.
//!
//! Two section indexers run alongside the chain:
//!
//! - the **CHT** (canonical hash trie) maps block numbers to canonical hashes
//!   and total difficulties, so a client holding one trusted root can verify
//!   any historical header with a Merkle proof;
//! - the **bloom trie** stores compressed per-bit bloom vectors, so a client
//!   can find candidate blocks for a log filter without every header.
//!
//! Both are driven section by section through [`ChainIndexerBackend`]. The
//! trie for section `n` is built on top of the one committed for `n - 1`,
//! and each committed root is recorded in the main store by
//! `(section, head hash)`.

mod backend;
mod bloom_trie;
mod checkpoint;
mod cht;
mod config;
mod error;
mod metrics;
pub mod section_root;

pub use backend::{BackendState, ChainIndexerBackend};
pub use bloom_trie::{bloom_trie_key, BloomTrieIndexerBackend};
pub use checkpoint::{
    CheckpointRegistry, TrustedCheckpoint, MAINNET_GENESIS_HASH, ROPSTEN_GENESIS_HASH,
};
pub use cht::{cht_key, ChtIndexerBackend, ChtNode};
pub use config::{ConfigError, IndexerMode, IndexerParams, LightConfig, SectionConfig};
pub use error::IndexerError;
pub use metrics::{IndexerMetrics, MetricsSnapshot};
pub use section_root::RootKind;

/// CHT section size seen by light clients.
pub const CHT_FREQUENCY_CLIENT: u64 = 32768;
/// CHT section size indexed by servers.
pub const CHT_FREQUENCY_SERVER: u64 = 4096;
/// Confirmations before a client-side helper trie section is built.
pub const HELPER_TRIE_CONFIRMATIONS: u64 = 2048;
/// Confirmations before a server-side helper trie section is built.
pub const HELPER_TRIE_PROCESS_CONFIRMATIONS: u64 = 256;
/// Bloom trie section size.
pub const BLOOM_TRIE_FREQUENCY: u64 = 32768;
/// Section size of the bloom-bits index.
pub const BLOOM_BITS_SECTION: u64 = 4096;
/// Confirmations the bloom-bits index waits for.
pub const BLOOM_BITS_CONFIRMATIONS: u64 = 256;

pub const CHT_TABLE_PREFIX: &str = "cht-";
pub const BLOOM_TRIE_TABLE_PREFIX: &str = "blt-";
pub const CHT_INDEX_TABLE_PREFIX: &str = "chtIndex-";
pub const BLOOM_TRIE_INDEX_TABLE_PREFIX: &str = "bltIndex-";
