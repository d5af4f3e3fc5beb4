//! Merkle Patricia Trie with lazily loaded, store-backed nodes.
//!
//! This module implements the trie the helper indexes are built on,
//! including RLP encoding/decoding and Keccak hashing.

mod node;
mod trie;
mod rlp_encode;
mod rlp_decode;


pub use node::{Node, NodeHash, keccak256, EMPTY_ROOT, HASH_SIZE};
pub use trie::{MerkleProof, MerkleTrie, TrieError};
pub use rlp_encode::RlpEncoder;
pub use rlp_decode::{RlpDecoder, RlpError};
