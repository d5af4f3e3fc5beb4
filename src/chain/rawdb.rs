//! Raw accessors for chain data the indexers read.
//!
//! Key layouts match the ones the header and bloom-bits pipelines write:
//!
//! - total difficulty: `"h" ++ number (u64 BE) ++ hash ++ "t"` -> RLP(td)
//! - bloom bits: `"B" ++ bit (u16 BE) ++ section (u64 BE) ++ head` -> compressed vector

use primitive_types::{H256, U256};
use thiserror::Error;

use crate::merkle::{RlpDecoder, RlpEncoder, RlpError};
use crate::store::{DbError, KeyValueStore};

/// Width of a log bloom filter in bits.
pub const BLOOM_BIT_LENGTH: u16 = 2048;

const HEADER_PREFIX: &[u8] = b"h";
const HEADER_TD_SUFFIX: &[u8] = b"t";
const BLOOM_BITS_PREFIX: &[u8] = b"B";

/// Chain data access errors.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Malformed entry: {0}")]
    Rlp(#[from] RlpError),
    #[error("Bloom bits not found: bit {bit}, section {section}, head {head:?}")]
    MissingBloomBits { bit: u16, section: u64, head: H256 },
}

/// Key of the total difficulty entry for a header.
pub fn header_td_key(number: u64, hash: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(HEADER_PREFIX.len() + 8 + 32 + HEADER_TD_SUFFIX.len());
    key.extend_from_slice(HEADER_PREFIX);
    key.extend_from_slice(&number.to_be_bytes());
    key.extend_from_slice(hash.as_bytes());
    key.extend_from_slice(HEADER_TD_SUFFIX);
    key
}

/// Key of a bloom-bits vector.
pub fn bloom_bits_key(bit: u16, section: u64, head: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOOM_BITS_PREFIX.len() + 2 + 8 + 32);
    key.extend_from_slice(BLOOM_BITS_PREFIX);
    key.extend_from_slice(&bit.to_be_bytes());
    key.extend_from_slice(&section.to_be_bytes());
    key.extend_from_slice(head.as_bytes());
    key
}

/// Reads the total difficulty of a header. A missing entry is `Ok(None)`.
pub fn read_td(
    db: &dyn KeyValueStore,
    hash: &H256,
    number: u64,
) -> Result<Option<U256>, ChainError> {
    match db.get(&header_td_key(number, hash))? {
        Some(data) => {
            let mut dec = RlpDecoder::new(&data);
            let td = dec.decode_u256()?;
            dec.finish()?;
            Ok(Some(td))
        }
        None => Ok(None),
    }
}

/// Writes the total difficulty of a header.
pub fn write_td(
    db: &dyn KeyValueStore,
    hash: &H256,
    number: u64,
    td: U256,
) -> Result<(), DbError> {
    let mut enc = RlpEncoder::new();
    enc.encode_u256(td);
    db.put(&header_td_key(number, hash), enc.as_bytes())
}

/// Reads the compressed bloom-bits vector of one bit in one section.
///
/// Unlike most reads, a missing vector is an error: the bloom-bits index
/// must be complete for every section handed to the bloom trie.
pub fn read_bloom_bits(
    db: &dyn KeyValueStore,
    bit: u16,
    section: u64,
    head: &H256,
) -> Result<Vec<u8>, ChainError> {
    db.get(&bloom_bits_key(bit, section, head))?
        .ok_or(ChainError::MissingBloomBits {
            bit,
            section,
            head: *head,
        })
}

/// Writes the compressed bloom-bits vector of one bit in one section.
pub fn write_bloom_bits(
    db: &dyn KeyValueStore,
    bit: u16,
    section: u64,
    head: &H256,
    bits: &[u8],
) -> Result<(), DbError> {
    db.put(&bloom_bits_key(bit, section, head), bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDb;
    use hex_literal::hex;

    #[test]
    fn test_td_key_layout() {
        let key = header_td_key(0x0102, &H256::repeat_byte(0xaa));
        assert_eq!(key.len(), 1 + 8 + 32 + 1);
        assert_eq!(&key[..9], &hex!("680000000000000102"));
        assert_eq!(key[41], b't');
    }

    #[test]
    fn test_bloom_bits_key_layout() {
        let key = bloom_bits_key(0x07ff, 3, &H256::repeat_byte(0xbb));
        assert_eq!(&key[..11], &hex!("4207ff0000000000000003"));
        assert_eq!(&key[11..], H256::repeat_byte(0xbb).as_bytes());
    }

    #[test]
    fn test_td_roundtrip() {
        let db = MemoryDb::new();
        let hash = H256::repeat_byte(0x01);

        assert_eq!(read_td(&db, &hash, 7).unwrap(), None);
        write_td(&db, &hash, 7, U256::from(43u64)).unwrap();
        assert_eq!(read_td(&db, &hash, 7).unwrap(), Some(U256::from(43u64)));
        // Same hash at a different height is a different entry.
        assert_eq!(read_td(&db, &hash, 8).unwrap(), None);
    }

    #[test]
    fn test_missing_bloom_bits_is_error() {
        let db = MemoryDb::new();
        let head = H256::repeat_byte(0x02);

        let err = read_bloom_bits(&db, 5, 0, &head).unwrap_err();
        assert!(matches!(err, ChainError::MissingBloomBits { bit: 5, section: 0, .. }));

        write_bloom_bits(&db, 5, 0, &head, &[0x01]).unwrap();
        assert_eq!(read_bloom_bits(&db, 5, 0, &head).unwrap(), vec![0x01]);
    }
}
