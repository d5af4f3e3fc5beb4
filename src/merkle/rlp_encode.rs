//! RLP (Recursive Length Prefix) encoding for Ethereum.
//!
//! RLP is used to encode trie nodes, CHT leaves and headers.

use primitive_types::{H256, U256};

/// RLP encoder for building RLP-encoded data.
#[derive(Clone, Debug)]
pub struct RlpEncoder {
    buffer: Vec<u8>,
}

impl RlpEncoder {
    /// Creates a new empty encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Returns the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the encoder and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Clears the encoder.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Encodes a byte slice as a string.
    pub fn encode_bytes(&mut self, bytes: &[u8]) {
        if bytes.len() == 1 && bytes[0] < 0x80 {
            self.buffer.push(bytes[0]);
        } else if bytes.len() < 56 {
            self.buffer.push(0x80 + bytes.len() as u8);
            self.buffer.extend_from_slice(bytes);
        } else {
            let len_bytes = Self::encode_length(bytes.len());
            self.buffer.push(0xb7 + len_bytes.len() as u8);
            self.buffer.extend_from_slice(&len_bytes);
            self.buffer.extend_from_slice(bytes);
        }
    }

    /// Encodes an empty string.
    pub fn encode_empty(&mut self) {
        self.buffer.push(0x80);
    }

    /// Appends an item that is already RLP encoded.
    pub fn encode_raw(&mut self, encoded: &[u8]) {
        self.buffer.extend_from_slice(encoded);
    }

    /// Starts encoding a list, returns the position to write length later.
    pub fn start_list(&mut self) -> usize {
        let pos = self.buffer.len();
        // Placeholder, patched by finish_list
        self.buffer.push(0);
        pos
    }

    /// Finishes encoding a list started at the given position.
    pub fn finish_list(&mut self, start_pos: usize) {
        let content_len = self.buffer.len() - start_pos - 1;

        if content_len < 56 {
            self.buffer[start_pos] = 0xc0 + content_len as u8;
        } else {
            let len_bytes = Self::encode_length(content_len);
            let header_len = 1 + len_bytes.len();

            let extra = header_len - 1;
            let old_len = self.buffer.len();
            self.buffer.resize(old_len + extra, 0);
            self.buffer.copy_within(start_pos + 1..old_len, start_pos + header_len);

            self.buffer[start_pos] = 0xf7 + len_bytes.len() as u8;
            self.buffer[start_pos + 1..start_pos + header_len].copy_from_slice(&len_bytes);
        }
    }

    /// Encodes a list of items.
    pub fn encode_list<F>(&mut self, encode_items: F)
    where
        F: FnOnce(&mut Self),
    {
        let start = self.start_list();
        encode_items(self);
        self.finish_list(start);
    }

    /// Encodes the length as big-endian bytes without leading zeros.
    fn encode_length(len: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut n = len;

        if n == 0 {
            return vec![0];
        }

        while n > 0 {
            bytes.push((n & 0xff) as u8);
            n >>= 8;
        }

        bytes.reverse();
        bytes
    }

    /// Encodes a u64 value.
    pub fn encode_u64(&mut self, value: u64) {
        let bytes = value.to_be_bytes();
        self.encode_uint_bytes(&bytes);
    }

    /// Encodes an unsigned big integer as a minimal big-endian string.
    pub fn encode_u256(&mut self, value: U256) {
        let bytes = value.to_big_endian();
        self.encode_uint_bytes(&bytes);
    }

    /// Encodes a 32-byte hash verbatim.
    pub fn encode_h256(&mut self, hash: &H256) {
        self.encode_bytes(hash.as_bytes());
    }

    fn encode_uint_bytes(&mut self, be_bytes: &[u8]) {
        let start = be_bytes.iter().position(|&b| b != 0).unwrap_or(be_bytes.len());
        self.encode_bytes(&be_bytes[start..]);
    }

    /// Encodes compact nibbles (for leaf/extension nodes).
    ///
    /// HP (Hex-Prefix) encoding:
    /// - First nibble: flags (0=extension even, 1=extension odd, 2=leaf even, 3=leaf odd)
    /// - Remaining nibbles: path
    pub fn encode_nibbles(&mut self, nibbles: &[u8], is_leaf: bool) {
        let odd = nibbles.len() % 2 == 1;
        let prefix = match (is_leaf, odd) {
            (true, true) => 0x3,
            (true, false) => 0x2,
            (false, true) => 0x1,
            (false, false) => 0x0,
        };

        let mut encoded = Vec::with_capacity((nibbles.len() + 2) / 2);

        if odd {
            encoded.push((prefix << 4) | nibbles[0]);
            for chunk in nibbles[1..].chunks(2) {
                encoded.push((chunk[0] << 4) | chunk.get(1).copied().unwrap_or(0));
            }
        } else {
            encoded.push(prefix << 4);
            for chunk in nibbles.chunks(2) {
                encoded.push((chunk[0] << 4) | chunk.get(1).copied().unwrap_or(0));
            }
        }

        self.encode_bytes(&encoded);
    }
}

impl Default for RlpEncoder {
    fn default() -> Self {
        Self::new()
    }
}
