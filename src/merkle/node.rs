//! Merkle trie node types.

use tiny_keccak::{Hasher, Keccak};

use super::rlp_decode::RlpDecoder;
use super::rlp_encode::RlpEncoder;
use super::trie::TrieError;

/// Hash size (Keccak-256).
pub const HASH_SIZE: usize = 32;

/// A node in the Merkle Patricia Trie.
///
/// Children are held as a [`NodeHash`]: a child whose encoding is shorter
/// than 32 bytes is embedded in its parent, anything larger is referenced by
/// its Keccak-256 digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Empty node (null).
    Empty,

    /// Leaf node: contains the remainder of the key and the value.
    Leaf {
        /// Remaining nibbles of the key.
        path: Vec<u8>,
        /// The value stored at this leaf.
        value: Vec<u8>,
    },

    /// Extension node: contains a shared path prefix and a child.
    Extension {
        /// Shared path prefix (nibbles).
        path: Vec<u8>,
        /// Reference to the child node.
        child: NodeHash,
    },

    /// Branch node: has up to 16 children (one for each nibble) and an optional value.
    Branch {
        /// Children (16 slots, one per nibble).
        children: Box<[Option<NodeHash>; 16]>,
        /// Optional value stored at this branch.
        value: Option<Vec<u8>>,
    },
}

impl Node {
    /// Creates a leaf node.
    pub fn leaf(path: Vec<u8>, value: Vec<u8>) -> Self {
        Node::Leaf { path, value }
    }

    /// Creates an extension node.
    pub fn extension(path: Vec<u8>, child: NodeHash) -> Self {
        Node::Extension { path, child }
    }

    /// RLP encodes the node.
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = RlpEncoder::new();
        self.encode_to(&mut encoder);
        encoder.into_bytes()
    }

    /// RLP encodes the node to the given encoder.
    pub fn encode_to(&self, encoder: &mut RlpEncoder) {
        match self {
            Node::Empty => {
                encoder.encode_empty();
            }
            Node::Leaf { path, value } => {
                encoder.encode_list(|e| {
                    e.encode_nibbles(path, true);
                    e.encode_bytes(value);
                });
            }
            Node::Extension { path, child } => {
                encoder.encode_list(|e| {
                    e.encode_nibbles(path, false);
                    child.encode_to(e);
                });
            }
            Node::Branch { children, value } => {
                encoder.encode_list(|e| {
                    for child in children.iter() {
                        match child {
                            Some(child) => child.encode_to(e),
                            None => e.encode_empty(),
                        }
                    }
                    match value {
                        Some(v) => e.encode_bytes(v),
                        None => e.encode_empty(),
                    }
                });
            }
        }
    }

    /// Decodes a node from its RLP encoding.
    ///
    /// A child given as a list is an embedded node and is kept as
    /// [`NodeHash::Inline`]; a child given as a string must be a 32-byte hash.
    pub fn decode(data: &[u8]) -> Result<Self, TrieError> {
        let mut dec = RlpDecoder::new(data);
        if data == [0x80u8].as_slice() {
            dec.decode_bytes()?;
            return Ok(Node::Empty);
        }

        let mut items = dec.decode_list()?;
        dec.finish()?;

        let node = match items.remaining_items()? {
            2 => {
                let (path, is_leaf) = decode_nibbles(items.decode_bytes()?)?;
                if is_leaf {
                    Node::Leaf {
                        path,
                        value: items.decode_bytes()?.to_vec(),
                    }
                } else {
                    let child = decode_child(&mut items)?.ok_or(TrieError::InvalidNode)?;
                    Node::Extension { path, child }
                }
            }
            17 => {
                let mut children: Box<[Option<NodeHash>; 16]> = Box::default();
                for slot in children.iter_mut() {
                    *slot = decode_child(&mut items)?;
                }
                let value = items.decode_bytes()?;
                Node::Branch {
                    children,
                    value: (!value.is_empty()).then(|| value.to_vec()),
                }
            }
            _ => return Err(TrieError::InvalidNode),
        };

        items.finish()?;
        Ok(node)
    }

    /// Computes the reference a parent holds for this node.
    ///
    /// If the encoded node is >= 32 bytes, returns the Keccak-256 hash.
    /// If the encoded node is < 32 bytes, the node is embedded inline.
    pub fn hash(&self) -> NodeHash {
        NodeHash::from_encoded(self.encode())
    }

    /// Computes the Keccak-256 hash of the node (always returns a hash).
    pub fn keccak(&self) -> [u8; HASH_SIZE] {
        keccak256(&self.encode())
    }
}

/// How a parent refers to a child node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeHash {
    /// The hash of the encoded node.
    Hash([u8; HASH_SIZE]),
    /// The node is small enough to be embedded inline.
    Inline(Vec<u8>),
}

impl NodeHash {
    /// Chooses the reference for an encoded node.
    pub fn from_encoded(encoded: Vec<u8>) -> Self {
        if encoded.len() >= HASH_SIZE {
            NodeHash::Hash(keccak256(&encoded))
        } else {
            NodeHash::Inline(encoded)
        }
    }

    /// Returns the hash bytes (for inline nodes, returns the keccak of the inline data).
    pub fn as_hash(&self) -> [u8; HASH_SIZE] {
        match self {
            NodeHash::Hash(h) => *h,
            NodeHash::Inline(data) => keccak256(data),
        }
    }

    /// Returns true if this is a full hash (not inline).
    pub fn is_hash(&self) -> bool {
        matches!(self, NodeHash::Hash(_))
    }

    /// Writes the reference as a branch or extension item.
    pub fn encode_to(&self, encoder: &mut RlpEncoder) {
        match self {
            NodeHash::Hash(h) => encoder.encode_bytes(h),
            NodeHash::Inline(data) => encoder.encode_raw(data),
        }
    }
}

/// Reads one child slot: empty, an embedded node, or a hash.
fn decode_child(items: &mut RlpDecoder<'_>) -> Result<Option<NodeHash>, TrieError> {
    if items.next_is_list()? {
        let raw = items.decode_raw()?;
        if raw.len() >= HASH_SIZE {
            return Err(TrieError::InvalidNode);
        }
        return Ok(Some(NodeHash::Inline(raw.to_vec())));
    }

    let bytes = items.decode_bytes()?;
    match bytes.len() {
        0 => Ok(None),
        HASH_SIZE => {
            let mut hash = [0u8; HASH_SIZE];
            hash.copy_from_slice(bytes);
            Ok(Some(NodeHash::Hash(hash)))
        }
        _ => Err(TrieError::InvalidNode),
    }
}

/// Decodes hex-prefix encoded nibbles, returning the path and the leaf flag.
fn decode_nibbles(encoded: &[u8]) -> Result<(Vec<u8>, bool), TrieError> {
    let first = *encoded.first().ok_or(TrieError::InvalidNode)?;
    let flag = first >> 4;
    if flag > 3 {
        return Err(TrieError::InvalidNode);
    }
    let is_leaf = flag & 0x2 != 0;
    let odd = flag & 0x1 != 0;

    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if odd {
        nibbles.push(first & 0x0F);
    } else if first & 0x0F != 0 {
        return Err(TrieError::InvalidNode);
    }
    for byte in &encoded[1..] {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    Ok((nibbles, is_leaf))
}

/// Computes Keccak-256 hash of data.
pub fn keccak256(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; HASH_SIZE];
    hasher.finalize(&mut hash);
    hash
}

/// The empty trie root hash (keccak of RLP empty string).
pub const EMPTY_ROOT: [u8; HASH_SIZE] = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6,
    0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0,
    0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
];
