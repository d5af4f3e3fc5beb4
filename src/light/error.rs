//! Indexer errors.

use primitive_types::H256;
use thiserror::Error;

use super::backend::BackendState;
use super::config::ConfigError;
use super::section_root::RootKind;
use crate::chain::ChainError;
use crate::data::CompressError;
use crate::merkle::{RlpError, TrieError};
use crate::store::DbError;

/// Errors surfaced by the section indexer backends.
///
/// I/O class errors (`Db`, `Trie`, `Chain`, `Compress`) are recovered by the
/// driver replaying the whole section. The remaining kinds mean the driver
/// or an upstream pipeline broke its contract; see [`IndexerError::is_fatal`].
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Trie error: {0}")]
    Trie(#[from] TrieError),
    #[error("Chain data error: {0}")]
    Chain(#[from] ChainError),
    #[error("Bloom bits decompression failed: {0}")]
    Compress(#[from] CompressError),
    #[error("Malformed entry: {0}")]
    Rlp(#[from] RlpError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{op} called while backend is {state:?}")]
    InvalidState { op: &'static str, state: BackendState },
    #[error("Unexpected header #{got}, expected #{expected}")]
    UnexpectedHeader { expected: u64, got: u64 },
    #[error("Section {section} incomplete: processed {processed} of {expected} headers")]
    IncompleteSection { section: u64, processed: u64, expected: u64 },
    #[error("Head of sub-section {index} in section {section} was never recorded")]
    MissingSubsectionHead { section: u64, index: usize },
    #[error("No {kind} root for section {section} with head {head:?}")]
    MissingSectionRoot { kind: RootKind, section: u64, head: H256 },
    #[error("Total difficulty missing for header #{number} ({hash:?})")]
    MissingTotalDifficulty { number: u64, hash: H256 },
    #[error("Section {section} of size {section_size} is beyond the last block number")]
    SectionOutOfRange { section: u64, section_size: u64 },
}

impl IndexerError {
    /// Returns true if indexing must stop rather than retry the section.
    ///
    /// Missing total difficulty is an invariant violation upstream; the
    /// sequencing errors are bugs in the driver. Replaying the section would
    /// only reproduce them or, worse, persist an incomplete checkpoint.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IndexerError::MissingTotalDifficulty { .. }
                | IndexerError::InvalidState { .. }
                | IndexerError::UnexpectedHeader { .. }
                | IndexerError::IncompleteSection { .. }
                | IndexerError::MissingSubsectionHead { .. }
                | IndexerError::MissingSectionRoot { .. }
                | IndexerError::SectionOutOfRange { .. }
                | IndexerError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let missing_td = IndexerError::MissingTotalDifficulty {
            number: 42,
            hash: H256::zero(),
        };
        assert!(missing_td.is_fatal());

        let out_of_order = IndexerError::InvalidState {
            op: "commit",
            state: BackendState::Idle,
        };
        assert!(out_of_order.is_fatal());

        let out_of_range = IndexerError::SectionOutOfRange {
            section: u64::MAX,
            section_size: 4096,
        };
        assert!(out_of_range.is_fatal());

        assert!(!IndexerError::Db(DbError::Closed).is_fatal());
        assert!(!IndexerError::Compress(CompressError::MissingData).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = IndexerError::UnexpectedHeader { expected: 10, got: 12 };
        assert_eq!(err.to_string(), "Unexpected header #12, expected #10");

        let err = IndexerError::MissingSectionRoot {
            kind: RootKind::Cht,
            section: 3,
            head: H256::zero(),
        };
        assert!(err.to_string().starts_with("No CHT root for section 3"));
    }
}
