//! Back-reference decompression for legacy KV3 blocks.
//!
//! The stream is a sequence of groups. Each group starts with a 16-bit
//! little-endian mask; its bits, least significant first, say whether the
//! next token is a literal byte (clear) or a 16-bit back-reference (set).
//!
//! ```text
//! back-reference token (u16, LE):
//!   bits 4..16  offset - 1   (distance behind the output end)
//!   bits 0..4   length - 3
//! ```
//!
//! Decompression ends as soon as the output reaches the target size, even in
//! the middle of a group or of a copy.

use log::trace;

use crate::kv3::types::error::{Kv3Error, Result};
use crate::kv3::utils::ByteCursor;

const MIN_MATCH: usize = 3;

/// Decompresses from `input` until exactly `target` bytes have been produced.
///
/// # Errors
/// - [`Kv3Error::BackReferenceOutOfRange`] if a token points before the start
///   of the output.
/// - [`Kv3Error::SizeMismatch`] if the input runs out before `target` bytes
///   were produced.
pub fn decompress(input: &mut ByteCursor<'_>, target: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(target);

    'groups: while output.len() < target {
        let mask = input.read_u16().map_err(|_| short_input(&output, target))?;

        for bit in 0..16 {
            if mask & (1 << bit) != 0 {
                let token = input.read_u16().map_err(|_| short_input(&output, target))?;
                let offset = ((token & 0xFFF0) >> 4) as usize + 1;
                let length = (token & 0x000F) as usize + MIN_MATCH;
                copy_match(&mut output, offset, length, target)?;
            } else {
                let literal = input.read_u8().map_err(|_| short_input(&output, target))?;
                output.push(literal);
            }

            if output.len() == target {
                break 'groups;
            }
        }
    }

    trace!(
        "Legacy stream decompressed: {} bytes, {} input bytes left",
        output.len(),
        input.remaining()
    );
    Ok(output)
}

fn short_input(output: &[u8], target: usize) -> Kv3Error {
    Kv3Error::SizeMismatch {
        context: "legacy decompressed stream",
        expected: target as u64,
        found: output.len() as u64,
    }
}

/// Appends `length` bytes starting `offset` bytes behind the end of `output`.
///
/// When the match overlaps the bytes it produces, the first
/// `min(offset, length)` bytes are repeated, which gives run-length
/// expansion for short offsets. Never grows `output` past `target`.
fn copy_match(output: &mut Vec<u8>, offset: usize, length: usize, target: usize) -> Result<()> {
    if offset > output.len() {
        return Err(Kv3Error::BackReferenceOutOfRange {
            offset,
            produced: output.len(),
        });
    }

    let start = output.len() - offset;
    let chunk = offset.min(length);
    let mut remaining = length;
    while remaining > 0 && output.len() < target {
        let n = chunk.min(remaining).min(target - output.len());
        output.extend_from_within(start..start + n);
        remaining -= n;
    }
    Ok(())
}
