//! Compiled-in trusted checkpoints.
//!
//! A checkpoint pins the helper-trie roots of one client-frequency section.
//! Light clients use it to skip syncing and verifying every header below the
//! checkpoint. Entries are keyed by genesis hash.

use hashbrown::HashMap;
use hex_literal::hex;
use primitive_types::H256;
use rustc_hash::FxBuildHasher;

/// Genesis hash of Ethereum mainnet.
pub const MAINNET_GENESIS_HASH: H256 = H256(hex!(
    "d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3"
));

/// Genesis hash of the Ropsten testnet.
pub const ROPSTEN_GENESIS_HASH: H256 = H256(hex!(
    "41941023680923e0fe4d74a34bdac8141f2540e3ae90623718e47d66d1ca4a2d"
));

/// Helper-trie roots trusted for one client-frequency section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustedCheckpoint {
    pub name: String,
    pub section_index: u64,
    /// Hash of the last block of the section.
    pub section_head: H256,
    pub cht_root: H256,
    pub bloom_trie_root: H256,
}

impl TrustedCheckpoint {
    /// Number of the last block covered by the checkpoint, or `None` if it
    /// does not fit in a `u64`.
    pub fn head_number(&self, section_size: u64) -> Option<u64> {
        self.section_index
            .checked_add(1)?
            .checked_mul(section_size)?
            .checked_sub(1)
    }
}

/// Checkpoints by genesis hash.
#[derive(Clone, Debug, Default)]
pub struct CheckpointRegistry {
    checkpoints: HashMap<H256, TrustedCheckpoint, FxBuildHasher>,
}

impl CheckpointRegistry {
    /// The registry of compiled-in checkpoints.
    pub fn builtin() -> Self {
        Self::new([
            (
                MAINNET_GENESIS_HASH,
                TrustedCheckpoint {
                    name: "mainnet".to_string(),
                    section_index: 174,
                    section_head: H256(hex!(
                        "a3ef48cd8f1c3a08419f0237fc7763491fe89497b3144b17adf87c1c43664613"
                    )),
                    cht_root: H256(hex!(
                        "dcbeed9f4dea1b3cb75601bb27c51b9960c28e5850275402ac49a150a667296e"
                    )),
                    bloom_trie_root: H256(hex!(
                        "6b7497a4a03e33870a2383cb6f5e70570f12b1bf5699063baf8c71d02ca90b02"
                    )),
                },
            ),
            (
                ROPSTEN_GENESIS_HASH,
                TrustedCheckpoint {
                    name: "ropsten".to_string(),
                    section_index: 102,
                    section_head: H256(hex!(
                        "9017ab08465cb2b2dee035ee5b817bbd7fa28e2c8d2cd903e0aed1cccb249e89"
                    )),
                    cht_root: H256(hex!(
                        "f61c10a7a787a5ef15f0ae1ae6c13c64331e57e79d0466d2bd9b0c06833fe956"
                    )),
                    bloom_trie_root: H256(hex!(
                        "69f2ad19aa46d5213a90137b3d2c9bff8a7c9483f7170f0125096ff450c9a873"
                    )),
                },
            ),
        ])
    }

    /// Builds a registry from explicit entries. Later entries replace
    /// earlier ones with the same genesis hash.
    pub fn new(entries: impl IntoIterator<Item = (H256, TrustedCheckpoint)>) -> Self {
        Self {
            checkpoints: entries.into_iter().collect(),
        }
    }

    /// Looks up the checkpoint of a network.
    pub fn get(&self, genesis: &H256) -> Option<&TrustedCheckpoint> {
        self.checkpoints.get(genesis)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&H256, &TrustedCheckpoint)> {
        self.checkpoints.iter()
    }
}
