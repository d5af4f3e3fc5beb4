//! Persisted section roots.
//!
//! Every committed section leaves one entry in the main store:
//!
//! ```text
//! prefix ++ section (u64 BE) ++ section head hash -> trie root
//! ```
//!
//! with prefix `"chtRoot-"` for the CHT and `"bltRoot-"` for the bloom trie.
//! Keying by head hash keeps roots from different forks apart: a reorg past a
//! section boundary simply produces a new key.

use std::fmt;

use primitive_types::H256;

use super::config::SectionConfig;
use crate::store::{DbError, KeyValueStore, Result};

/// Key prefix of CHT roots.
pub const CHT_ROOT_PREFIX: &[u8] = b"chtRoot-";
/// Key prefix of bloom trie roots.
pub const BLOOM_TRIE_ROOT_PREFIX: &[u8] = b"bltRoot-";

/// Which helper trie a root belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RootKind {
    Cht,
    BloomTrie,
}

impl RootKind {
    /// Key prefix for this kind of root.
    pub fn prefix(self) -> &'static [u8] {
        match self {
            RootKind::Cht => CHT_ROOT_PREFIX,
            RootKind::BloomTrie => BLOOM_TRIE_ROOT_PREFIX,
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootKind::Cht => write!(f, "CHT"),
            RootKind::BloomTrie => write!(f, "bloom trie"),
        }
    }
}

/// Builds the store key of a section root.
pub fn section_root_key(kind: RootKind, section: u64, head: &H256) -> Vec<u8> {
    let prefix = kind.prefix();
    let mut key = Vec::with_capacity(prefix.len() + 8 + 32);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&section.to_be_bytes());
    key.extend_from_slice(head.as_bytes());
    key
}

/// Reads a section root. A missing entry is `Ok(None)`.
pub fn read_section_root(
    db: &dyn KeyValueStore,
    kind: RootKind,
    section: u64,
    head: &H256,
) -> Result<Option<H256>> {
    match db.get(&section_root_key(kind, section, head))? {
        Some(data) if data.len() == 32 => Ok(Some(H256::from_slice(&data))),
        Some(data) => Err(DbError::Corrupted(format!(
            "{kind} root for section {section} is {} bytes",
            data.len()
        ))),
        None => Ok(None),
    }
}

/// Writes a section root, overwriting any previous value for the same key.
pub fn write_section_root(
    db: &dyn KeyValueStore,
    kind: RootKind,
    section: u64,
    head: &H256,
    root: &H256,
) -> Result<()> {
    db.put(&section_root_key(kind, section, head), root.as_bytes())
}

/// Returns the CHT root of a section, or the zero hash if none is stored.
pub fn get_cht_root(db: &dyn KeyValueStore, section: u64, head: &H256) -> Result<H256> {
    Ok(read_section_root(db, RootKind::Cht, section, head)?.unwrap_or_default())
}

/// Returns the CHT root for a client-frequency section index.
///
/// Servers index at the finer frequency, so the client section `section`
/// ends with server section `(section + 1) * ratio - 1`. `head` is the hash
/// of the shared last block. A section whose server index overflows has no
/// root.
pub fn get_cht_v2_root(
    db: &dyn KeyValueStore,
    config: &SectionConfig,
    section: u64,
    head: &H256,
) -> Result<H256> {
    match config.client_to_server_section(section) {
        Some(server_section) => get_cht_root(db, server_section, head),
        None => Ok(H256::zero()),
    }
}

/// Stores the CHT root of a section.
pub fn store_cht_root(db: &dyn KeyValueStore, section: u64, head: &H256, root: &H256) -> Result<()> {
    write_section_root(db, RootKind::Cht, section, head, root)
}

/// Returns the bloom trie root of a section, or the zero hash if none is stored.
pub fn get_bloom_trie_root(db: &dyn KeyValueStore, section: u64, head: &H256) -> Result<H256> {
    Ok(read_section_root(db, RootKind::BloomTrie, section, head)?.unwrap_or_default())
}

/// Stores the bloom trie root of a section.
pub fn store_bloom_trie_root(
    db: &dyn KeyValueStore,
    section: u64,
    head: &H256,
    root: &H256,
) -> Result<()> {
    write_section_root(db, RootKind::BloomTrie, section, head, root)
}
