//! Canonical Hash Trie indexer.
//!
//! The CHT maps every block number up to the end of a section to the
//! canonical hash and total difficulty of that block:
//!
//! ```text
//! key:   number (u64 BE)
//! value: RLP([hash, td])
//! ```
//!
//! Section `n` is built on top of the trie committed for section `n - 1`,
//! so the root of section `n` commits to blocks `0 ..= (n + 1) * size - 1`.
//! Trie nodes live in the `"cht-"` table; roots go to the main store through
//! [`super::section_root`].

use std::sync::Arc;

use primitive_types::{H256, U256};
use tracing::{debug, info, warn};

use super::backend::{
    expect_state, open_section_trie, section_start, BackendState, ChainIndexerBackend,
};
use super::config::{IndexerMode, LightConfig};
use super::error::IndexerError;
use super::metrics::IndexerMetrics;
use super::section_root::{store_cht_root, RootKind};
use super::CHT_TABLE_PREFIX;
use crate::chain::{rawdb, Header};
use crate::merkle::{MerkleProof, MerkleTrie, RlpDecoder, RlpEncoder, RlpError};
use crate::store::{SharedStore, Table};

/// A CHT leaf value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChtNode {
    pub hash: H256,
    pub td: U256,
}

impl ChtNode {
    /// Encodes as `RLP([hash, td])`.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = RlpEncoder::new();
        let list = enc.start_list();
        enc.encode_h256(&self.hash);
        enc.encode_u256(self.td);
        enc.finish_list(list);
        enc.into_bytes()
    }

    /// Decodes a leaf value.
    pub fn decode(data: &[u8]) -> Result<Self, RlpError> {
        let mut outer = RlpDecoder::new(data);
        let mut list = outer.decode_list()?;
        let hash = list.decode_h256()?;
        let td = list.decode_u256()?;
        list.finish()?;
        outer.finish()?;
        Ok(Self { hash, td })
    }
}

/// Trie key of the CHT leaf for a block number.
pub fn cht_key(number: u64) -> [u8; 8] {
    number.to_be_bytes()
}

/// Builds one CHT section per reset/process/commit cycle.
pub struct ChtIndexerBackend {
    diskdb: SharedStore,
    triedb: Table,
    section_size: u64,
    client_frequency: u64,
    state: BackendState,
    section: u64,
    start: u64,
    next_number: u64,
    last_hash: H256,
    trie: MerkleTrie,
    metrics: Arc<IndexerMetrics>,
}

impl ChtIndexerBackend {
    /// Creates a backend sectioned for `mode`.
    pub fn new(
        diskdb: SharedStore,
        config: &LightConfig,
        mode: IndexerMode,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        let triedb = Table::new(diskdb.clone(), CHT_TABLE_PREFIX);
        Ok(Self {
            diskdb,
            triedb,
            section_size: config.cht.section_size(mode),
            client_frequency: config.cht.client_frequency,
            state: BackendState::Idle,
            section: 0,
            start: 0,
            next_number: 0,
            last_hash: H256::zero(),
            trie: MerkleTrie::new(),
            metrics: Arc::new(IndexerMetrics::new()),
        })
    }

    /// Reports into a shared metrics container.
    pub fn with_metrics(mut self, metrics: Arc<IndexerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &IndexerMetrics {
        &self.metrics
    }

    pub fn section_size(&self) -> u64 {
        self.section_size
    }

    /// Section currently being built or last committed.
    pub fn section(&self) -> u64 {
        self.section
    }

    /// Looks up a leaf of the current trie.
    pub fn leaf(&self, number: u64) -> Result<Option<ChtNode>, IndexerError> {
        match self.trie.get(&self.triedb, &cht_key(number))? {
            Some(data) => Ok(Some(ChtNode::decode(&data)?)),
            None => Ok(None),
        }
    }

    /// Proves the leaf of `number` (or its absence) against the current root.
    pub fn prove(&mut self, number: u64) -> Result<MerkleProof, IndexerError> {
        Ok(self.trie.generate_proof(&self.triedb, &cht_key(number))?)
    }

    fn section_end(&self) -> u64 {
        self.start + self.section_size
    }

    fn insert_header(&mut self, header: &Header) -> Result<(), IndexerError> {
        if header.number != self.next_number {
            return Err(IndexerError::UnexpectedHeader {
                expected: self.next_number,
                got: header.number,
            });
        }
        if header.number >= self.section_end() {
            return Err(IndexerError::UnexpectedHeader {
                expected: self.section_end() - 1,
                got: header.number,
            });
        }

        let hash = header.hash();
        let td = rawdb::read_td(&*self.diskdb, &hash, header.number)?.ok_or(
            IndexerError::MissingTotalDifficulty {
                number: header.number,
                hash,
            },
        )?;

        let value = ChtNode { hash, td }.encode();
        self.trie.insert(&self.triedb, &cht_key(header.number), value)?;
        self.metrics.add_leaves_written(1);
        self.last_hash = hash;
        self.next_number += 1;
        Ok(())
    }

    fn commit_section(&mut self) -> Result<H256, IndexerError> {
        let processed = self.next_number - self.start;
        if processed != self.section_size {
            return Err(IndexerError::IncompleteSection {
                section: self.section,
                processed,
                expected: self.section_size,
            });
        }

        let root = H256::from(self.trie.commit(&self.triedb)?);
        store_cht_root(&*self.diskdb, self.section, &self.last_hash, &root)?;

        if self.section_end() % self.client_frequency == 0 {
            info!(
                section = self.start / self.client_frequency,
                head = ?self.last_hash,
                root = ?root,
                "Storing CHT"
            );
        }
        Ok(root)
    }
}

impl ChainIndexerBackend for ChtIndexerBackend {
    fn reset(&mut self, section: u64, last_section_head: H256) -> Result<(), IndexerError> {
        self.state = BackendState::Idle;
        let start = section_start(section, self.section_size)?;
        self.trie = open_section_trie(
            &*self.diskdb,
            &self.triedb,
            RootKind::Cht,
            section,
            &last_section_head,
        )?;
        self.section = section;
        self.start = start;
        self.next_number = start;
        self.last_hash = last_section_head;
        self.state = BackendState::Building;
        debug!(section, head = ?last_section_head, "CHT section reset");
        Ok(())
    }

    fn process(&mut self, header: &Header) -> Result<(), IndexerError> {
        expect_state(self.state, BackendState::Building, "process")?;
        self.insert_header(header).map_err(|err| {
            self.state = BackendState::Idle;
            err
        })
    }

    fn commit(&mut self) -> Result<(), IndexerError> {
        expect_state(self.state, BackendState::Building, "commit")?;
        match self.commit_section() {
            Ok(_) => {
                self.metrics.inc_sections_committed();
                self.state = BackendState::Committed;
                Ok(())
            }
            Err(err) => {
                warn!(section = self.section, error = %err, "CHT commit failed");
                self.metrics.inc_sections_aborted();
                self.state = BackendState::Idle;
                Err(err)
            }
        }
    }

    fn state(&self) -> BackendState {
        self.state
    }
}
