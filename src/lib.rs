//! # ethrex_light
//!
//! Server-side helper tries for the ethrex light client protocol.
//!
//! ## Architecture
//!
//! Two section indexers turn finalized chain data into Merkle tries a light
//! client can query with proofs:
//!
//! 1. **CHT** - block number -> (canonical hash, total difficulty)
//! 2. **Bloom trie** - (bloom bit, section) -> compressed bit vector
//!
//! Each committed section root is persisted by `(section, head hash)`, and a
//! small registry of trusted checkpoints lets clients start from a known
//! section instead of genesis.
//!
//! ## Modules
//!
//! - `data` - Bloom-bits vector compression
//! - `store` - Key-value store abstraction and prefixed tables
//! - `chain` - Headers and the raw chain data the indexers read
//! - `merkle` - Merkle Patricia Trie with node persistence
//! - `light` - The indexer backends, section roots and checkpoints

pub mod data;
pub mod store;
pub mod chain;
pub mod merkle;
pub mod light;
