//! Byte-level data encodings shared by the helper tries.

mod compress;


pub use compress::{compress_bytes, decompress_bytes, CompressError};
