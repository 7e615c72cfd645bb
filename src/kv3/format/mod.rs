//! Block format parsing layer.
//!
//! This module bridges a raw block byte range and the decoded document tree.
//!
//! # Module Organization
//!
//! - [`legacy`]: Assembles legacy blocks (inline back-reference compression)
//! - [`current`]: Assembles current-revision blocks (lanes + block codec)
//! - [`value`]: Decodes the value tree shared by both revisions
//!
//! # Architecture
//!
//! ```text
//! Block:
//! ┌─────────────────┐
//! │  Signature (4)  │ ← decode_with()
//! ├─────────────────┤
//! │  Revision       │ ← legacy::decode() / current::decode()
//! │  header +       │
//! │  payload        │
//! └─────────────────┘
//!          │ flat buffer + lane cursors
//!          ▼
//!   value::DecodeContext::parse_root()
//! ```

use log::trace;

use crate::kv3::codec::block::{BlockDecompressor, Lz4BlockDecompressor};
use crate::kv3::types::error::{Kv3Error, Result};
use crate::kv3::types::models::{DecodeOptions, Revision};
use crate::kv3::types::node::Kv3Document;
use crate::kv3::utils::ByteCursor;

pub mod current;
pub mod legacy;
pub mod value;

/// Upper bound on speculative pre-allocation for the string table.
const MAX_STRING_PREALLOC: usize = 4096;

/// Decodes one block with default options and the LZ4 block codec.
pub fn decode(block: &[u8]) -> Result<Kv3Document> {
    decode_with(block, &DecodeOptions::default(), &Lz4BlockDecompressor)
}

/// Decodes one block.
///
/// Only the first four bytes are read before the revision is known; an
/// unknown signature fails without touching the rest of the block.
///
/// # Errors
/// Any failure aborts the whole block; no partial tree is returned.
pub fn decode_with(
    block: &[u8],
    options: &DecodeOptions,
    decompressor: &dyn BlockDecompressor,
) -> Result<Kv3Document> {
    let mut cursor = ByteCursor::new(block, "KV3 block");
    let signature = cursor.read_array::<4>()?;
    let revision = Revision::detect(signature)?;
    trace!("Signature {:02x?} -> {} revision", signature, revision);

    match revision {
        Revision::Legacy => legacy::decode(&mut cursor, options),
        Revision::Current => current::decode(&mut cursor, options, decompressor),
    }
}

/// Reads 16 bytes and checks them against a fixed identifier.
fn expect_constant(
    cursor: &mut ByteCursor<'_>,
    field: &'static str,
    expected: &[u8; 16],
) -> Result<()> {
    let found = cursor.read_array::<16>()?;
    if &found != expected {
        return Err(Kv3Error::ConstantMismatch { field, found });
    }
    Ok(())
}

/// Reads `count` NUL-terminated strings.
///
/// Every string needs at least one byte, so running out of buffer before the
/// count is reached is an error.
fn read_strings(cursor: &mut ByteCursor<'_>, count: u32) -> Result<Vec<String>> {
    let count = count as usize;
    let mut strings = Vec::with_capacity(count.min(MAX_STRING_PREALLOC));
    for read in 0..count {
        if cursor.is_empty() {
            return Err(Kv3Error::UnexpectedEof {
                context: "string table",
                position: cursor.tell(),
                needed: count - read,
                available: 0,
            });
        }
        strings.push(cursor.read_cstring()?);
    }
    Ok(strings)
}
