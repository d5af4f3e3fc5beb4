//! Sparse bitset compression for bloom-bit vectors.
//!
//! Bloom-bit vectors are mostly zero bytes. The encoding stores a bitset of
//! the non-zero byte positions (itself encoded recursively) followed by the
//! non-zero bytes. Peers exchange these vectors, so the format must match
//! other implementations byte for byte.

use thiserror::Error;

/// Decompression errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompressError {
    #[error("missing bytes on input")]
    MissingData,
    #[error("extra bytes on input")]
    UnreferencedData,
    #[error("target data size exceeded")]
    ExceededTarget,
    #[error("zero byte in input content")]
    ZeroContent,
}

/// Compresses a byte slice.
///
/// Falls back to a plain copy when the sparse encoding would not be
/// strictly shorter than the input. An empty or all-zero input compresses
/// to an empty vector.
pub fn compress_bytes(data: &[u8]) -> Vec<u8> {
    let out = bitset_encode_bytes(data);
    if out.len() < data.len() {
        out
    } else {
        data.to_vec()
    }
}

fn bitset_encode_bytes(data: &[u8]) -> Vec<u8> {
    match data.len() {
        0 => return Vec::new(),
        1 => {
            return if data[0] == 0 { Vec::new() } else { data.to_vec() };
        }
        _ => {}
    }

    let mut non_zero_bitset = vec![0u8; (data.len() + 7) / 8];
    let mut non_zero_bytes = Vec::with_capacity(data.len());

    for (i, &b) in data.iter().enumerate() {
        if b != 0 {
            non_zero_bytes.push(b);
            non_zero_bitset[i / 8] |= 1 << (7 - i % 8);
        }
    }
    if non_zero_bytes.is_empty() {
        return Vec::new();
    }

    let mut out = bitset_encode_bytes(&non_zero_bitset);
    out.extend_from_slice(&non_zero_bytes);
    out
}

/// Decompresses `data` into exactly `target` bytes.
///
/// The caller must know the decompressed length up front; a mismatch
/// between the encoded content and `target` is an error.
pub fn decompress_bytes(data: &[u8], target: usize) -> Result<Vec<u8>, CompressError> {
    if data.len() > target {
        return Err(CompressError::ExceededTarget);
    }
    if data.len() == target {
        return Ok(data.to_vec());
    }
    bitset_decode_bytes(data, target)
}

fn bitset_decode_bytes(data: &[u8], target: usize) -> Result<Vec<u8>, CompressError> {
    let (out, size) = bitset_decode_partial_bytes(data, target)?;
    if size != data.len() {
        return Err(CompressError::UnreferencedData);
    }
    Ok(out)
}

/// Decodes a prefix of `data`, returning the output and the number of input
/// bytes consumed.
fn bitset_decode_partial_bytes(
    data: &[u8],
    target: usize,
) -> Result<(Vec<u8>, usize), CompressError> {
    if target == 0 {
        return Ok((Vec::new(), 0));
    }

    let mut decomp = vec![0u8; target];
    if data.is_empty() {
        return Ok((decomp, 0));
    }
    if target == 1 {
        decomp[0] = data[0];
        let consumed = if data[0] != 0 { 1 } else { 0 };
        return Ok((decomp, consumed));
    }

    let (non_zero_bitset, mut ptr) = bitset_decode_partial_bytes(data, (target + 7) / 8)?;
    for i in 0..8 * non_zero_bitset.len() {
        if non_zero_bitset[i / 8] & (1 << (7 - i % 8)) != 0 {
            if ptr >= data.len() {
                return Err(CompressError::MissingData);
            }
            if i >= decomp.len() {
                return Err(CompressError::ExceededTarget);
            }
            if data[ptr] == 0 {
                return Err(CompressError::ZeroContent);
            }
            decomp[i] = data[ptr];
            ptr += 1;
        }
    }
    Ok((decomp, ptr))
}
