//! Section frequencies and confirmation depths.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    BLOOM_BITS_CONFIRMATIONS, BLOOM_BITS_SECTION, BLOOM_TRIE_FREQUENCY,
    BLOOM_TRIE_INDEX_TABLE_PREFIX, CHT_FREQUENCY_CLIENT, CHT_FREQUENCY_SERVER,
    CHT_INDEX_TABLE_PREFIX, HELPER_TRIE_CONFIRMATIONS, HELPER_TRIE_PROCESS_CONFIRMATIONS,
};

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Section frequency must be non-zero")]
    ZeroFrequency,
    #[error("Client frequency {client} is not a multiple of server frequency {server}")]
    UnevenFrequencies { client: u64, server: u64 },
    #[error("Bloom-bits section size {0} is not a multiple of 8")]
    NotByteAligned(u64),
    #[error("Confirmations {confirmations} below bloom-bits confirmations {bloom_bits}")]
    ConfirmationsTooLow { confirmations: u64, bloom_bits: u64 },
}

/// A `{client, server}` section frequency pair.
///
/// Servers index at the finer `server_frequency`; clients consume sections
/// of `client_frequency` blocks. The client frequency must be an exact
/// multiple of the server frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionConfig {
    pub client_frequency: u64,
    pub server_frequency: u64,
}

impl SectionConfig {
    /// Creates a validated frequency pair.
    pub fn new(client_frequency: u64, server_frequency: u64) -> Result<Self, ConfigError> {
        let config = Self {
            client_frequency,
            server_frequency,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that both frequencies are non-zero and divide evenly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_frequency == 0 || self.server_frequency == 0 {
            return Err(ConfigError::ZeroFrequency);
        }
        if self.client_frequency % self.server_frequency != 0 {
            return Err(ConfigError::UnevenFrequencies {
                client: self.client_frequency,
                server: self.server_frequency,
            });
        }
        Ok(())
    }

    /// Number of server sections per client section.
    pub fn ratio(&self) -> u64 {
        self.client_frequency / self.server_frequency
    }

    /// Maps a client-frequency section index to the server-frequency index
    /// covering the same last block. `None` if that index does not fit in
    /// a `u64`.
    pub fn client_to_server_section(&self, section: u64) -> Option<u64> {
        section
            .checked_add(1)?
            .checked_mul(self.ratio())?
            .checked_sub(1)
    }

    /// Section size for the given mode.
    pub fn section_size(&self, mode: IndexerMode) -> u64 {
        match mode {
            IndexerMode::Client => self.client_frequency,
            IndexerMode::Server => self.server_frequency,
        }
    }
}

/// Which side of the protocol an indexer runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerMode {
    /// Light client: consumes client-frequency sections.
    Client,
    /// Serving node: indexes at server frequency.
    Server,
}

/// What the external chain indexer needs to host a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexerParams {
    /// Indexer name, used in logs.
    pub name: &'static str,
    /// Blocks per section.
    pub section_size: u64,
    /// Confirmations required past a section's last block.
    pub confirmations: u64,
    /// Prefix of the driver's own progress table.
    pub index_table_prefix: &'static str,
}

/// Helper-trie configuration.
///
/// `Default` yields the protocol constants; peers only interoperate when
/// these match, so a deserialized config must pass `validate()` before use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// CHT frequencies.
    pub cht: SectionConfig,
    /// Bloom trie frequencies: `client_frequency` is the aggregate section,
    /// `server_frequency` the bloom-bits sub-section.
    pub bloom_trie: SectionConfig,
    pub helper_trie_confirmations: u64,
    pub helper_trie_process_confirmations: u64,
    pub bloom_bits_confirmations: u64,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            cht: SectionConfig {
                client_frequency: CHT_FREQUENCY_CLIENT,
                server_frequency: CHT_FREQUENCY_SERVER,
            },
            bloom_trie: SectionConfig {
                client_frequency: BLOOM_TRIE_FREQUENCY,
                server_frequency: BLOOM_BITS_SECTION,
            },
            helper_trie_confirmations: HELPER_TRIE_CONFIRMATIONS,
            helper_trie_process_confirmations: HELPER_TRIE_PROCESS_CONFIRMATIONS,
            bloom_bits_confirmations: BLOOM_BITS_CONFIRMATIONS,
        }
    }
}

impl LightConfig {
    /// Validates every frequency pair and confirmation depth.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cht.validate()?;
        self.bloom_trie.validate()?;

        // Bloom-bits vectors hold one bit per block.
        for size in [self.bloom_trie.client_frequency, self.bloom_trie.server_frequency] {
            if size % 8 != 0 {
                return Err(ConfigError::NotByteAligned(size));
            }
        }

        let lowest = self
            .helper_trie_confirmations
            .min(self.helper_trie_process_confirmations);
        if lowest < self.bloom_bits_confirmations {
            return Err(ConfigError::ConfirmationsTooLow {
                confirmations: lowest,
                bloom_bits: self.bloom_bits_confirmations,
            });
        }
        Ok(())
    }

    fn confirmations(&self, mode: IndexerMode) -> u64 {
        match mode {
            IndexerMode::Client => self.helper_trie_confirmations,
            IndexerMode::Server => self.helper_trie_process_confirmations,
        }
    }

    /// Driver parameters for the CHT indexer.
    pub fn cht_params(&self, mode: IndexerMode) -> IndexerParams {
        IndexerParams {
            name: "cht",
            section_size: self.cht.section_size(mode),
            confirmations: self.confirmations(mode),
            index_table_prefix: CHT_INDEX_TABLE_PREFIX,
        }
    }

    /// Driver parameters for the bloom trie indexer.
    ///
    /// The bloom trie always runs at the aggregate frequency and waits for
    /// the bloom-bits indexer, so its own confirmation depth is reduced by
    /// the bloom-bits depth.
    pub fn bloom_trie_params(&self, mode: IndexerMode) -> Result<IndexerParams, ConfigError> {
        let confirmations = self.confirmations(mode);
        let confirmations = confirmations
            .checked_sub(self.bloom_bits_confirmations)
            .ok_or(ConfigError::ConfirmationsTooLow {
                confirmations,
                bloom_bits: self.bloom_bits_confirmations,
            })?;
        Ok(IndexerParams {
            name: "bloomtrie",
            section_size: self.bloom_trie.client_frequency,
            confirmations,
            index_table_prefix: BLOOM_TRIE_INDEX_TABLE_PREFIX,
        })
    }
}
