//! Bloom trie indexer.
//!
//! The bloom trie stores, for every bloom bit and every aggregate section, the
//! compressed bit vector of that bit across all blocks of the section:
//!
//! ```text
//! key:   bit (u16 BE) ++ section (u64 BE)
//! value: compress_bytes(bits of blocks section*size .. (section+1)*size)
//! ```
//!
//! The vectors are assembled from the bloom-bits index, which is built at a
//! finer sub-section size. For each sub-section the backend remembers the
//! head hash seen while processing and uses it to look the vectors up.

use std::sync::Arc;

use primitive_types::H256;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::backend::{
    expect_state, open_section_trie, section_start, BackendState, ChainIndexerBackend,
};
use super::config::{IndexerMode, LightConfig};
use super::error::IndexerError;
use super::metrics::{compression_ratio, IndexerMetrics};
use super::section_root::{store_bloom_trie_root, RootKind};
use super::BLOOM_TRIE_TABLE_PREFIX;
use crate::chain::{rawdb, Header, BLOOM_BIT_LENGTH};
use crate::data::{compress_bytes, decompress_bytes};
use crate::merkle::MerkleTrie;
use crate::store::{KeyValueStore, SharedStore, Table};

/// Trie key of the bloom column for `bit` in `section`.
pub fn bloom_trie_key(bit: u16, section: u64) -> [u8; 10] {
    let mut key = [0u8; 10];
    key[..2].copy_from_slice(&bit.to_be_bytes());
    key[2..].copy_from_slice(&section.to_be_bytes());
    key
}

/// One bit's compressed column and its decompressed size.
struct Column {
    bit: u16,
    compressed: Vec<u8>,
    decompressed_len: usize,
}

/// Builds one bloom trie section per reset/process/commit cycle.
pub struct BloomTrieIndexerBackend {
    diskdb: SharedStore,
    triedb: Table,
    section_size: u64,
    parent_section_size: u64,
    ratio: u64,
    state: BackendState,
    section: u64,
    start: u64,
    next_number: u64,
    section_heads: Vec<Option<H256>>,
    trie: MerkleTrie,
    metrics: Arc<IndexerMetrics>,
}

impl BloomTrieIndexerBackend {
    /// Creates a backend for `mode`.
    ///
    /// Servers read the bloom-bits index at its native sub-section size;
    /// clients maintain it at the aggregate size, so there is one
    /// sub-section per section.
    pub fn new(
        diskdb: SharedStore,
        config: &LightConfig,
        mode: IndexerMode,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        let section_size = config.bloom_trie.client_frequency;
        let parent_section_size = config.bloom_trie.section_size(mode);
        let ratio = section_size / parent_section_size;
        let triedb = Table::new(diskdb.clone(), BLOOM_TRIE_TABLE_PREFIX);
        Ok(Self {
            diskdb,
            triedb,
            section_size,
            parent_section_size,
            ratio,
            state: BackendState::Idle,
            section: 0,
            start: 0,
            next_number: 0,
            section_heads: vec![None; ratio as usize],
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

    /// Bloom-bits sub-sections per section.
    pub fn ratio(&self) -> u64 {
        self.ratio
    }

    pub fn section(&self) -> u64 {
        self.section
    }

    /// Compressed column of `bit` in `section`, if the current trie holds one.
    pub fn column(&self, bit: u16, section: u64) -> Result<Option<Vec<u8>>, IndexerError> {
        Ok(self.trie.get(&self.triedb, &bloom_trie_key(bit, section))?)
    }

    fn record_header(&mut self, header: &Header) -> Result<(), IndexerError> {
        let end = self.start + self.section_size;
        if header.number != self.next_number || header.number >= end {
            return Err(IndexerError::UnexpectedHeader {
                expected: self.next_number.min(end - 1),
                got: header.number,
            });
        }

        let offset = header.number - self.start;
        if (offset + 1) % self.parent_section_size == 0 {
            let index = (offset / self.parent_section_size) as usize;
            self.section_heads[index] = Some(header.hash());
        }
        self.next_number += 1;
        Ok(())
    }

    fn commit_section(&mut self) -> Result<H256, IndexerError> {
        let heads = self
            .section_heads
            .iter()
            .enumerate()
            .map(|(index, head)| {
                head.ok_or(IndexerError::MissingSubsectionHead {
                    section: self.section,
                    index,
                })
            })
            .collect::<Result<Vec<H256>, _>>()?;

        let first = self.section * self.ratio;
        let target = (self.parent_section_size / 8) as usize;
        let diskdb: &dyn KeyValueStore = &*self.diskdb;

        // Columns are independent; apply them in bit order afterwards so
        // the trie sees the same sequence of updates on every run.
        let columns = (0..BLOOM_BIT_LENGTH)
            .into_par_iter()
            .map(|bit| build_column(diskdb, bit, first, &heads, target))
            .collect::<Result<Vec<Column>, IndexerError>>()?;

        let mut compressed_total = 0u64;
        let mut decompressed_total = 0u64;
        let mut written = 0u64;
        let mut deleted = 0u64;
        for column in columns {
            compressed_total += column.compressed.len() as u64;
            decompressed_total += column.decompressed_len as u64;

            let key = bloom_trie_key(column.bit, self.section);
            if column.compressed.is_empty() {
                self.trie.remove(&self.triedb, &key)?;
                deleted += 1;
            } else {
                self.trie.insert(&self.triedb, &key, column.compressed)?;
                written += 1;
            }
        }

        let root = H256::from(self.trie.commit(&self.triedb)?);
        // The last sub-section head is the head of the whole section.
        let head = heads[heads.len() - 1];
        store_bloom_trie_root(&*self.diskdb, self.section, &head, &root)?;

        self.metrics.add_leaves_written(written);
        self.metrics.add_leaves_deleted(deleted);
        self.metrics.add_bloom_bytes(compressed_total, decompressed_total);

        info!(
            section = self.section,
            head = ?head,
            root = ?root,
            compression = compression_ratio(compressed_total, decompressed_total),
            "Storing bloom trie"
        );
        Ok(root)
    }
}

/// Reads the vectors of one bit across all sub-sections, concatenates them
/// and recompresses the result.
fn build_column(
    db: &dyn KeyValueStore,
    bit: u16,
    first_subsection: u64,
    heads: &[H256],
    target: usize,
) -> Result<Column, IndexerError> {
    let mut decompressed = Vec::with_capacity(target * heads.len());
    for (j, head) in heads.iter().enumerate() {
        let stored = rawdb::read_bloom_bits(db, bit, first_subsection + j as u64, head)?;
        decompressed.extend_from_slice(&decompress_bytes(&stored, target)?);
    }
    Ok(Column {
        bit,
        compressed: compress_bytes(&decompressed),
        decompressed_len: decompressed.len(),
    })
}

impl ChainIndexerBackend for BloomTrieIndexerBackend {
    fn reset(&mut self, section: u64, last_section_head: H256) -> Result<(), IndexerError> {
        self.state = BackendState::Idle;
        let start = section_start(section, self.section_size)?;
        self.trie = open_section_trie(
            &*self.diskdb,
            &self.triedb,
            RootKind::BloomTrie,
            section,
            &last_section_head,
        )?;
        self.section = section;
        self.start = start;
        self.next_number = start;
        self.section_heads.iter_mut().for_each(|head| *head = None);
        self.state = BackendState::Building;
        debug!(section, head = ?last_section_head, "Bloom trie section reset");
        Ok(())
    }

    fn process(&mut self, header: &Header) -> Result<(), IndexerError> {
        expect_state(self.state, BackendState::Building, "process")?;
        self.record_header(header).map_err(|err| {
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
                warn!(section = self.section, error = %err, "Bloom trie commit failed");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::config::SectionConfig;
    use crate::light::section_root::get_bloom_trie_root;
    use crate::store::MemoryDb;
    use primitive_types::U256;

    /// 32-block sections of four 8-block sub-sections.
    fn small_config() -> LightConfig {
        LightConfig {
            bloom_trie: SectionConfig {
                client_frequency: 32,
                server_frequency: 8,
            },
            ..Default::default()
        }
    }

    fn chain(count: u64) -> Vec<Header> {
        let mut headers: Vec<Header> = Vec::new();
        for number in 0..count {
            let parent = headers.last().map(|h| h.hash()).unwrap_or_default();
            headers.push(Header::new(number, parent, U256::one()));
        }
        headers
    }

    /// Writes bloom bits for every sub-section of `section`: bit 0 has the
    /// first block of each sub-section set, every other bit is empty.
    fn seed_bloom_bits(db: &dyn KeyValueStore, headers: &[Header], section: u64) {
        for j in 0..4u64 {
            let subsection = section * 4 + j;
            let head = headers[(subsection * 8 + 7) as usize].hash();
            for bit in 0..BLOOM_BIT_LENGTH {
                let vector = if bit == 0 { vec![0x80] } else { vec![0x00] };
                rawdb::write_bloom_bits(db, bit, subsection, &head, &compress_bytes(&vector))
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(bloom_trie_key(0x0102, 3), [0x01, 0x02, 0, 0, 0, 0, 0, 0, 0, 0x03]);
    }

    #[test]
    fn test_builds_section() {
        let db: SharedStore = Arc::new(MemoryDb::new());
        let headers = chain(32);
        seed_bloom_bits(&*db, &headers, 0);

        let mut blt =
            BloomTrieIndexerBackend::new(db.clone(), &small_config(), IndexerMode::Server)
                .unwrap();
        assert_eq!(blt.ratio(), 4);

        blt.reset(0, H256::zero()).unwrap();
        for header in &headers {
            blt.process(header).unwrap();
        }
        blt.commit().unwrap();

        let root = get_bloom_trie_root(&*db, 0, &headers[31].hash()).unwrap();
        assert_ne!(root, H256::zero());

        // Only bit 0 has any set bits; every other column is absent.
        let stored = blt.column(0, 0).unwrap().unwrap();
        assert_eq!(
            decompress_bytes(&stored, 4).unwrap(),
            vec![0x80, 0x80, 0x80, 0x80]
        );

        let snapshot = blt.metrics().snapshot();
        assert_eq!(snapshot.leaves_written, 1);
        assert_eq!(snapshot.leaves_deleted, u64::from(BLOOM_BIT_LENGTH) - 1);
        assert_eq!(snapshot.decompressed_bytes, u64::from(BLOOM_BIT_LENGTH) * 4);
        for bit in 1..BLOOM_BIT_LENGTH {
            assert_eq!(blt.column(bit, 0).unwrap(), None);
        }
    }

    #[test]
    fn test_missing_bloom_bits_aborts() {
        let db = Arc::new(MemoryDb::new());
        let headers = chain(32);
        seed_bloom_bits(&*db, &headers, 0);
        db.delete(&rawdb::bloom_bits_key(1234, 2, &headers[23].hash())).unwrap();

        let mut blt =
            BloomTrieIndexerBackend::new(db.clone(), &small_config(), IndexerMode::Server)
                .unwrap();
        blt.reset(0, H256::zero()).unwrap();
        for header in &headers {
            blt.process(header).unwrap();
        }

        let err = blt.commit().unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Chain(rawdb::ChainError::MissingBloomBits { bit: 1234, section: 2, .. })
        ));
        assert!(!err.is_fatal());
        assert_eq!(blt.state(), BackendState::Idle);
        assert_eq!(db.count_prefix(b"bltRoot-"), 0);
    }

    #[test]
    fn test_corrupt_vector_aborts() {
        let db = Arc::new(MemoryDb::new());
        let headers = chain(32);
        seed_bloom_bits(&*db, &headers, 0);
        // Longer than the one byte a sub-section vector decompresses to.
        rawdb::write_bloom_bits(&*db, 7, 0, &headers[7].hash(), &[0x80, 0x01]).unwrap();

        let mut blt =
            BloomTrieIndexerBackend::new(db.clone(), &small_config(), IndexerMode::Server)
                .unwrap();
        blt.reset(0, H256::zero()).unwrap();
        for header in &headers {
            blt.process(header).unwrap();
        }
        assert!(matches!(blt.commit(), Err(IndexerError::Compress(_))));
        assert_eq!(db.count_prefix(b"bltRoot-"), 0);
    }

    #[test]
    fn test_missing_subsection_head() {
        let db: SharedStore = Arc::new(MemoryDb::new());
        let headers = chain(32);
        let mut blt =
            BloomTrieIndexerBackend::new(db, &small_config(), IndexerMode::Server).unwrap();

        blt.reset(0, H256::zero()).unwrap();
        for header in &headers[..20] {
            blt.process(header).unwrap();
        }
        let err = blt.commit().unwrap_err();
        assert!(matches!(
            err,
            IndexerError::MissingSubsectionHead { section: 0, index: 2 }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_client_mode_uses_single_subsection() {
        let db: SharedStore = Arc::new(MemoryDb::new());
        let blt = BloomTrieIndexerBackend::new(db, &small_config(), IndexerMode::Client).unwrap();
        assert_eq!(blt.ratio(), 1);
        assert_eq!(blt.section_size(), 32);
    }

    #[test]
    fn test_client_mode_matches_server_root() {
        let headers = chain(32);

        let server_db: SharedStore = Arc::new(MemoryDb::new());
        seed_bloom_bits(&*server_db, &headers, 0);
        let mut server =
            BloomTrieIndexerBackend::new(server_db.clone(), &small_config(), IndexerMode::Server)
                .unwrap();
        server.reset(0, H256::zero()).unwrap();
        for header in &headers {
            server.process(header).unwrap();
        }
        server.commit().unwrap();

        // A client keeps one 32-block vector per bit, already concatenated.
        let client_db: SharedStore = Arc::new(MemoryDb::new());
        let head = headers[31].hash();
        for bit in 0..BLOOM_BIT_LENGTH {
            let vector = if bit == 0 { vec![0x80; 4] } else { vec![0x00; 4] };
            rawdb::write_bloom_bits(&*client_db, bit, 0, &head, &compress_bytes(&vector))
                .unwrap();
        }
        let mut client =
            BloomTrieIndexerBackend::new(client_db.clone(), &small_config(), IndexerMode::Client)
                .unwrap();
        client.reset(0, H256::zero()).unwrap();
        for header in &headers {
            client.process(header).unwrap();
        }
        client.commit().unwrap();
        assert_eq!(client.state(), BackendState::Committed);

        let server_root = get_bloom_trie_root(&*server_db, 0, &head).unwrap();
        let client_root = get_bloom_trie_root(&*client_db, 0, &head).unwrap();
        assert_ne!(client_root, H256::zero());
        assert_eq!(client_root, server_root);
        assert_eq!(client.column(0, 0).unwrap(), server.column(0, 0).unwrap());
    }

    #[test]
    fn test_reset_out_of_range_section() {
        let db: SharedStore = Arc::new(MemoryDb::new());
        let mut blt =
            BloomTrieIndexerBackend::new(db, &small_config(), IndexerMode::Server).unwrap();

        let err = blt.reset(u64::MAX, H256::zero()).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::SectionOutOfRange { section: u64::MAX, section_size: 32 }
        ));
        assert_eq!(blt.state(), BackendState::Idle);
    }

    #[test]
    fn test_rejects_header_from_other_section() {
        let db: SharedStore = Arc::new(MemoryDb::new());
        let headers = chain(40);
        let mut blt =
            BloomTrieIndexerBackend::new(db, &small_config(), IndexerMode::Server).unwrap();

        blt.reset(0, H256::zero()).unwrap();
        let err = blt.process(&headers[35]).unwrap_err();
        assert!(matches!(err, IndexerError::UnexpectedHeader { expected: 0, got: 35 }));
    }
}
