//! The contract between the chain indexer driver and a section backend.

use primitive_types::H256;

use super::error::IndexerError;
use super::section_root::{read_section_root, RootKind};
use crate::chain::Header;
use crate::merkle::MerkleTrie;
use crate::store::KeyValueStore;

/// Where a backend is in its per-section cycle.
///
/// ```text
/// Idle --reset--> Building --process*--> Building --commit--> Committed
///   ^                                                            |
///   +----------------------------- reset ------------------------+
/// ```
///
/// A failed `process` or `commit` drops the backend back to `Idle`; the
/// driver must `reset` and replay the section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendState {
    Idle,
    Building,
    Committed,
}

/// A section processor driven by the external chain indexer.
///
/// The driver calls `reset` once per section, then `process` for each header
/// of the section in ascending order, then `commit`. Calls are never
/// concurrent for one backend.
pub trait ChainIndexerBackend {
    /// Starts a new section. `last_section_head` is the hash of the last
    /// block of the previous section, or zero for section 0.
    fn reset(&mut self, section: u64, last_section_head: H256) -> Result<(), IndexerError>;

    /// Adds one header of the current section.
    fn process(&mut self, header: &Header) -> Result<(), IndexerError>;

    /// Finishes the current section and persists its root.
    fn commit(&mut self) -> Result<(), IndexerError>;

    /// Current lifecycle state.
    fn state(&self) -> BackendState;
}

pub(crate) fn expect_state(
    current: BackendState,
    wanted: BackendState,
    op: &'static str,
) -> Result<(), IndexerError> {
    if current == wanted {
        Ok(())
    } else {
        Err(IndexerError::InvalidState { op, state: current })
    }
}

/// First block number of `section`, provided the whole section fits in a
/// `u64`.
pub(crate) fn section_start(section: u64, section_size: u64) -> Result<u64, IndexerError> {
    section
        .checked_add(1)
        .and_then(|count| count.checked_mul(section_size))
        .map(|end| end - section_size)
        .ok_or(IndexerError::SectionOutOfRange { section, section_size })
}

/// Opens the trie a section builds on: empty for section 0, otherwise the
/// trie committed for `section - 1` ending at `last_head`.
pub(crate) fn open_section_trie(
    diskdb: &dyn KeyValueStore,
    triedb: &dyn KeyValueStore,
    kind: RootKind,
    section: u64,
    last_head: &H256,
) -> Result<MerkleTrie, IndexerError> {
    if section == 0 {
        return Ok(MerkleTrie::new());
    }
    let parent = section - 1;
    let root = read_section_root(diskdb, kind, parent, last_head)?.ok_or(
        IndexerError::MissingSectionRoot {
            kind,
            section: parent,
            head: *last_head,
        },
    )?;
    Ok(MerkleTrie::open(root.as_fixed_bytes(), triedb)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::section_root::store_cht_root;
    use crate::merkle::EMPTY_ROOT;
    use crate::store::MemoryDb;

    #[test]
    fn test_expect_state() {
        assert!(expect_state(BackendState::Building, BackendState::Building, "process").is_ok());

        let err = expect_state(BackendState::Idle, BackendState::Building, "commit").unwrap_err();
        assert!(matches!(
            err,
            IndexerError::InvalidState {
                op: "commit",
                state: BackendState::Idle
            }
        ));
    }

    #[test]
    fn test_section_start() {
        assert_eq!(section_start(0, 4096).unwrap(), 0);
        assert_eq!(section_start(3, 4096).unwrap(), 12288);
        assert_eq!(section_start(u64::MAX / 4096 - 1, 4096).unwrap(), u64::MAX / 4096 * 4096 - 4096);

        let err = section_start(u64::MAX / 4096, 4096).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::SectionOutOfRange { section, section_size: 4096 } if section == u64::MAX / 4096
        ));
        assert!(section_start(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_section_zero_opens_empty() {
        let db = MemoryDb::new();
        let mut trie =
            open_section_trie(&db, &db, RootKind::Cht, 0, &H256::repeat_byte(9)).unwrap();
        assert!(trie.is_empty());
        assert_eq!(trie.root_hash(), EMPTY_ROOT);
    }

    #[test]
    fn test_missing_parent_root() {
        let db = MemoryDb::new();
        let head = H256::repeat_byte(0x42);
        let err = open_section_trie(&db, &db, RootKind::Cht, 3, &head).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::MissingSectionRoot { kind: RootKind::Cht, section: 2, head: h } if h == head
        ));
    }

    #[test]
    fn test_reopens_parent_trie() {
        let db = MemoryDb::new();
        let mut trie = MerkleTrie::new();
        trie.insert(&db, b"key", b"value".to_vec()).unwrap();
        let root = H256::from(trie.commit(&db).unwrap());

        let head = H256::repeat_byte(0x01);
        store_cht_root(&db, 0, &head, &root).unwrap();

        let reopened = open_section_trie(&db, &db, RootKind::Cht, 1, &head).unwrap();
        assert_eq!(reopened.get(&db, b"key").unwrap(), Some(b"value".to_vec()));
    }
}
