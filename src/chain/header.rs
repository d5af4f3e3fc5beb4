//! Block header as seen by the section indexers.

use primitive_types::{H256, U256};

use crate::merkle::{keccak256, RlpDecoder, RlpEncoder, RlpError};

/// A block header.
///
/// Only the fields the indexers and their tests need are carried; the hash
/// is the Keccak-256 of the RLP encoding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Parent block hash.
    pub parent_hash: H256,
    /// Block number.
    pub number: u64,
    /// Block difficulty.
    pub difficulty: U256,
    /// Block timestamp.
    pub timestamp: u64,
    /// Arbitrary extra data.
    pub extra_data: Vec<u8>,
}

impl Header {
    /// Creates a header with the given number, parent and difficulty.
    pub fn new(number: u64, parent_hash: H256, difficulty: U256) -> Self {
        Self {
            parent_hash,
            number,
            difficulty,
            ..Default::default()
        }
    }

    /// RLP encodes the header.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = RlpEncoder::new();
        enc.encode_list(|e| {
            e.encode_h256(&self.parent_hash);
            e.encode_u64(self.number);
            e.encode_u256(self.difficulty);
            e.encode_u64(self.timestamp);
            e.encode_bytes(&self.extra_data);
        });
        enc.into_bytes()
    }

    /// Decodes a header from its RLP encoding.
    pub fn decode(data: &[u8]) -> Result<Self, RlpError> {
        let mut dec = RlpDecoder::new(data);
        let mut fields = dec.decode_list()?;
        dec.finish()?;

        let header = Self {
            parent_hash: fields.decode_h256()?,
            number: fields.decode_u64()?,
            difficulty: fields.decode_u256()?,
            timestamp: fields.decode_u64()?,
            extra_data: fields.decode_bytes()?.to_vec(),
        };
        fields.finish()?;
        Ok(header)
    }

    /// Returns the block hash.
    pub fn hash(&self) -> H256 {
        H256::from(keccak256(&self.encode()))
    }
}
