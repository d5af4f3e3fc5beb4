//! Chain data consumed by the section indexers.
//!
//! Headers arrive from the external indexer driver; total difficulty and
//! bloom bits are read straight from the store written by the header and
//! bloom-bits pipelines.

mod header;
pub mod rawdb;

pub use header::Header;
pub use rawdb::{ChainError, BLOOM_BIT_LENGTH};
