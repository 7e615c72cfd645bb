//! External block decompression for current-revision payloads.
//!
//! The current revision can hand its whole payload to a block codec. The
//! reader only needs one operation from it, expressed by
//! [`BlockDecompressor`]. [`Lz4BlockDecompressor`] is the default, and any
//! closure with the right signature works as well, which keeps tests and
//! alternative codecs cheap to plug in.

use log::trace;

use crate::kv3::types::error::{Kv3Error, Result};

/// Decompresses one payload whose decompressed size is known up front.
pub trait BlockDecompressor {
    /// Returns the decompressed bytes.
    ///
    /// Implementations may return fewer or more than `expected_len` bytes;
    /// the caller validates the length.
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

impl<F> BlockDecompressor for F
where
    F: Fn(&[u8], usize) -> Result<Vec<u8>>,
{
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        self(compressed, expected_len)
    }
}

/// Raw LZ4 block format (no frame header), via `lz4_flex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4BlockDecompressor;

impl BlockDecompressor for Lz4BlockDecompressor {
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        trace!(
            "Decompressing with LZ4: {} bytes -> {} bytes (expected)",
            compressed.len(),
            expected_len
        );
        lz4_flex::block::decompress(compressed, expected_len)
            .map_err(|e| Kv3Error::DecompressionError(format!("LZ4 decompression failed: {}", e)))
    }
}

/// Runs `decompressor` and checks that it produced exactly `expected_len` bytes.
pub fn decompress_exact(
    decompressor: &dyn BlockDecompressor,
    compressed: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>> {
    let output = decompressor.decompress(compressed, expected_len)?;
    if output.len() != expected_len {
        return Err(Kv3Error::SizeMismatch {
            context: "decompressed payload",
            expected: expected_len as u64,
            found: output.len() as u64,
        });
    }
    Ok(output)
}
