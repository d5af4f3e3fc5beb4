//! RLP decoding.
//!
//! The decoder walks a borrowed buffer item by item. Lists are decoded by
//! handing out a sub-decoder over the list payload.

use primitive_types::{H256, U256};
use thiserror::Error;

/// RLP decoding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RlpError {
    #[error("Unexpected end of input")]
    UnexpectedEnd,
    #[error("Expected a string, found a list")]
    UnexpectedList,
    #[error("Expected a list, found a string")]
    UnexpectedString,
    #[error("Integer overflow")]
    Overflow,
    #[error("Invalid length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("Trailing bytes after item")]
    TrailingBytes,
}

/// Item header: kind, header length and payload length.
#[derive(Clone, Copy, Debug)]
struct Header {
    is_list: bool,
    header_len: usize,
    payload_len: usize,
}

/// Streaming RLP decoder over a byte slice.
#[derive(Clone, Debug)]
pub struct RlpDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RlpDecoder<'a> {
    /// Creates a decoder over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns true once every item has been consumed.
    pub fn is_done(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Fails if unconsumed bytes remain.
    pub fn finish(&self) -> Result<(), RlpError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(RlpError::TrailingBytes)
        }
    }

    /// Counts the items left in this decoder without consuming them.
    pub fn remaining_items(&self) -> Result<usize, RlpError> {
        let mut cursor = self.clone();
        let mut count = 0;
        while !cursor.is_done() {
            cursor.skip()?;
            count += 1;
        }
        Ok(count)
    }

    fn header(&self) -> Result<Header, RlpError> {
        let rest = &self.data[self.pos..];
        let prefix = *rest.first().ok_or(RlpError::UnexpectedEnd)?;

        let (is_list, header_len, payload_len) = match prefix {
            0x00..=0x7f => (false, 0, 1),
            0x80..=0xb7 => (false, 1, (prefix - 0x80) as usize),
            0xb8..=0xbf => {
                let len_of_len = (prefix - 0xb7) as usize;
                (false, 1 + len_of_len, Self::read_length(&rest[1..], len_of_len)?)
            }
            0xc0..=0xf7 => (true, 1, (prefix - 0xc0) as usize),
            0xf8..=0xff => {
                let len_of_len = (prefix - 0xf7) as usize;
                (true, 1 + len_of_len, Self::read_length(&rest[1..], len_of_len)?)
            }
        };

        let total = header_len
            .checked_add(payload_len)
            .ok_or(RlpError::Overflow)?;
        if total > rest.len() {
            return Err(RlpError::UnexpectedEnd);
        }

        Ok(Header {
            is_list,
            header_len,
            payload_len,
        })
    }

    fn read_length(data: &[u8], len_of_len: usize) -> Result<usize, RlpError> {
        if len_of_len > std::mem::size_of::<usize>() {
            return Err(RlpError::Overflow);
        }
        let bytes = data.get(..len_of_len).ok_or(RlpError::UnexpectedEnd)?;
        Ok(bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize))
    }

    /// Skips the next item.
    pub fn skip(&mut self) -> Result<(), RlpError> {
        let h = self.header()?;
        self.pos += h.header_len + h.payload_len;
        Ok(())
    }

    /// Returns true if the next item is a list.
    pub fn next_is_list(&self) -> Result<bool, RlpError> {
        Ok(self.header()?.is_list)
    }

    /// Returns the full encoding (header included) of the next item.
    pub fn decode_raw(&mut self) -> Result<&'a [u8], RlpError> {
        let h = self.header()?;
        let start = self.pos;
        self.pos += h.header_len + h.payload_len;
        Ok(&self.data[start..self.pos])
    }

    /// Decodes the next item as a byte string.
    pub fn decode_bytes(&mut self) -> Result<&'a [u8], RlpError> {
        let h = self.header()?;
        if h.is_list {
            return Err(RlpError::UnexpectedList);
        }
        let start = self.pos + h.header_len;
        let end = start + h.payload_len;
        self.pos = end;
        Ok(&self.data[start..end])
    }

    /// Decodes the next item as a list, returning a decoder over its payload.
    pub fn decode_list(&mut self) -> Result<RlpDecoder<'a>, RlpError> {
        let h = self.header()?;
        if !h.is_list {
            return Err(RlpError::UnexpectedString);
        }
        let start = self.pos + h.header_len;
        let end = start + h.payload_len;
        self.pos = end;
        Ok(RlpDecoder::new(&self.data[start..end]))
    }

    /// Decodes the next item as a u64.
    pub fn decode_u64(&mut self) -> Result<u64, RlpError> {
        let bytes = self.decode_bytes()?;
        if bytes.len() > 8 {
            return Err(RlpError::Overflow);
        }
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// Decodes the next item as an unsigned big integer.
    pub fn decode_u256(&mut self) -> Result<U256, RlpError> {
        let bytes = self.decode_bytes()?;
        if bytes.len() > 32 {
            return Err(RlpError::Overflow);
        }
        Ok(U256::from_big_endian(bytes))
    }

    /// Decodes the next item as a 32-byte hash.
    pub fn decode_h256(&mut self) -> Result<H256, RlpError> {
        let bytes = self.decode_bytes()?;
        if bytes.len() != 32 {
            return Err(RlpError::InvalidLength {
                expected: 32,
                got: bytes.len(),
            });
        }
        Ok(H256::from_slice(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::RlpEncoder;
    use hex_literal::hex;

    #[test]
    fn test_decode_single_byte() {
        let mut dec = RlpDecoder::new(&[0x7f]);
        assert_eq!(dec.decode_bytes().unwrap(), &[0x7f]);
        assert!(dec.finish().is_ok());
    }

    #[test]
    fn test_decode_list() {
        let data = hex!("c88363617483646f67");
        let mut dec = RlpDecoder::new(&data);
        let mut list = dec.decode_list().unwrap();
        assert_eq!(list.remaining_items().unwrap(), 2);
        assert_eq!(list.decode_bytes().unwrap(), b"cat");
        assert_eq!(list.decode_bytes().unwrap(), b"dog");
        assert!(list.finish().is_ok());
        assert!(dec.finish().is_ok());
    }

    #[test]
    fn test_decode_long_list() {
        let mut enc = RlpEncoder::new();
        enc.encode_list(|e| {
            for _ in 0..4 {
                e.encode_bytes(&[0x11; 20]);
            }
        });
        let data = enc.into_bytes();
        assert_eq!(data[0], 0xf8);

        let mut dec = RlpDecoder::new(&data);
        let list = dec.decode_list().unwrap();
        assert_eq!(list.remaining_items().unwrap(), 4);
    }

    #[test]
    fn test_decode_integers() {
        let mut enc = RlpEncoder::new();
        enc.encode_u64(0);
        enc.encode_u64(1_000_000);
        enc.encode_u256(U256::from(43u64));
        let data = enc.into_bytes();

        let mut dec = RlpDecoder::new(&data);
        assert_eq!(dec.decode_u64().unwrap(), 0);
        assert_eq!(dec.decode_u64().unwrap(), 1_000_000);
        assert_eq!(dec.decode_u256().unwrap(), U256::from(43u64));
        assert!(dec.is_done());
    }

    #[test]
    fn test_decode_raw_item() {
        let data = hex!("c6c20102820304");
        let mut dec = RlpDecoder::new(&data);
        let mut list = dec.decode_list().unwrap();
        assert!(list.next_is_list().unwrap());
        assert_eq!(list.decode_raw().unwrap(), &hex!("c20102"));
        assert!(!list.next_is_list().unwrap());
        assert_eq!(list.decode_bytes().unwrap(), &[0x03, 0x04]);
        assert!(list.is_done());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(RlpDecoder::new(&[]).decode_bytes(), Err(RlpError::UnexpectedEnd));
        assert_eq!(RlpDecoder::new(&[0x83, b'd']).decode_bytes(), Err(RlpError::UnexpectedEnd));
        assert_eq!(RlpDecoder::new(&[0xc0]).decode_bytes(), Err(RlpError::UnexpectedList));
        assert_eq!(
            RlpDecoder::new(&[0x80]).decode_list().map(|_| ()),
            Err(RlpError::UnexpectedString)
        );
        assert_eq!(
            RlpDecoder::new(&hex!("820102")).decode_h256(),
            Err(RlpError::InvalidLength { expected: 32, got: 2 })
        );

        let mut dec = RlpDecoder::new(&[0x01, 0x02]);
        dec.decode_bytes().unwrap();
        assert_eq!(dec.finish(), Err(RlpError::TrailingBytes));
    }
}
