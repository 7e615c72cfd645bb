//! Assembler for current-revision (`\x013VK`) blocks.
//!
//! ```text
//! [16 bytes] format id
//! [ 4 bytes] compression method (0 = stored, 1 = block codec)
//! [ 4 bytes] blob lane byte count
//! [ 4 bytes] int lane entry count      (4 bytes each)
//! [ 4 bytes] double lane entry count   (8 bytes each)
//! [ 4 bytes] payload length (stored) / decompressed length (block codec)
//! [ rest   ] payload, verbatim or compressed
//! ```
//!
//! Payload layout:
//!
//! ```text
//! ┌──────────────┐ 0
//! │ blob lane    │
//! ├──────────────┤ padded to the next 4-byte boundary when non-empty
//! │ string count │
//! ├──────────────┤ structural start == int lane start
//! │ int lane     │
//! ├──────────────┤ double lane start
//! │ double lane  │
//! ├──────────────┤
//! │ strings      │
//! ├──────────────┤
//! │ type tags    │
//! ├──────────────┤ len - 4
//! │ trailer      │
//! └──────────────┘
//! ```
//!
//! Structural data (names, counts, string refs, inline scalars) is read from
//! the int lane region; 8-byte scalars always come from the double lane.

use log::{debug, info};

use crate::kv3::codec::block::{decompress_exact, BlockDecompressor};
use crate::kv3::types::error::{Kv3Error, Result};
use crate::kv3::types::models::{
    CompressionMethod, DecodeOptions, Revision, CURRENT_ROOT_KEY, FORMAT_GUID,
};
use crate::kv3::types::node::{Kv3Document, Node, Object, Value};
use crate::kv3::utils::ByteCursor;

use super::value::{DecodeContext, ScalarSource};
use super::{expect_constant, read_strings};

const TRAILER_LEN: usize = 4;

/// Lane element counts from the block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneCounts {
    pub blob_bytes: u32,
    pub ints: u32,
    pub doubles: u32,
}

/// Byte offsets of every lane inside the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneLayout {
    pub blob_end: usize,
    pub structural_start: usize,
    pub int_start: usize,
    pub double_start: usize,
    pub double_end: usize,
    pub types_start: usize,
    pub types_end: usize,
}

/// Decodes a current-revision block. `block` is positioned just after the
/// signature.
pub fn decode(
    block: &mut ByteCursor<'_>,
    options: &DecodeOptions,
    decompressor: &dyn BlockDecompressor,
) -> Result<Kv3Document> {
    info!("Decoding current KV3 block ({} bytes after signature)", block.remaining());

    expect_constant(block, "format", &FORMAT_GUID)?;

    let method = CompressionMethod::try_from(block.read_u32()?)?;
    let counts = LaneCounts {
        blob_bytes: block.read_u32()?,
        ints: block.read_u32()?,
        doubles: block.read_u32()?,
    };
    debug!("Compression {:?}, lanes {:?}", method, counts);

    let payload = read_payload(block, method, decompressor)?;
    let (layout, strings) = lay_out(&payload, counts)?;

    let structural = ByteCursor::region(
        &payload,
        layout.structural_start,
        layout.double_start,
        "structural data",
    )?;
    let doubles = ByteCursor::region(
        &payload,
        layout.double_start,
        layout.double_end,
        "double lane",
    )?;
    let mut context = DecodeContext::new(structural, &strings, options.max_depth)
        .with_max_values(options.max_values)
        .with_wide_source(ScalarSource::Lane(doubles));

    if layout.blob_end > 0 {
        context = context.with_blob_source(ScalarSource::Lane(ByteCursor::region(
            &payload,
            0,
            layout.blob_end,
            "blob lane",
        )?));
    }
    if layout.types_end > layout.types_start {
        context = context.with_type_lane(ByteCursor::region(
            &payload,
            layout.types_start,
            layout.types_end,
            "type lane",
        )?);
    }

    let root = context.parse_root()?;

    let mut wrapper = Object::with_capacity(1);
    wrapper.insert(CURRENT_ROOT_KEY, root);

    info!("Current KV3 block decoded: {} strings", strings.len());
    Ok(Kv3Document {
        revision: Revision::Current,
        strings,
        root: Node::new(Value::Object(wrapper)),
    })
}

fn read_payload(
    block: &mut ByteCursor<'_>,
    method: CompressionMethod,
    decompressor: &dyn BlockDecompressor,
) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::Stored => {
            let len = block.read_u32()? as usize;
            debug!("Stored payload: {} bytes", len);
            Ok(block.take(len)?.to_vec())
        }
        CompressionMethod::Block => {
            let expected = block.read_u32()? as usize;
            let compressed = block.take_rest();
            debug!(
                "Compressed payload: {} bytes -> {} bytes (expected)",
                compressed.len(),
                expected
            );
            decompress_exact(decompressor, compressed, expected)
        }
    }
}

/// Works out lane boundaries and reads the string table.
pub fn lay_out(payload: &[u8], counts: LaneCounts) -> Result<(LaneLayout, Vec<String>)> {
    let mut cursor = ByteCursor::new(payload, "current payload");

    let blob_end = counts.blob_bytes as usize;
    cursor.seek(blob_end)?;
    if blob_end > 0 {
        let pos = cursor.tell();
        cursor.seek(pos + (4 - pos % 4))?;
    }

    let string_count = cursor.read_u32()?;
    let structural_start = cursor.tell();
    let int_start = structural_start;
    cursor.skip(lane_len(counts.ints, 4, "int lane")?)?;
    let double_start = cursor.tell();
    cursor.skip(lane_len(counts.doubles, 8, "double lane")?)?;
    let double_end = cursor.tell();

    let strings = read_strings(&mut cursor, string_count)?;

    let types_start = cursor.tell();
    let types_end = payload.len().saturating_sub(TRAILER_LEN).max(types_start);

    let layout = LaneLayout {
        blob_end,
        structural_start,
        int_start,
        double_start,
        double_end,
        types_start,
        types_end,
    };
    debug!(
        "Lane layout: blobs [0, {:#x}), ints [{:#x}, {:#x}), doubles [{:#x}, {:#x})",
        layout.blob_end,
        layout.int_start,
        layout.double_start,
        layout.double_start,
        layout.double_end
    );
    debug!(
        "{} strings, {} type bytes",
        strings.len(),
        layout.types_end - layout.types_start
    );
    Ok((layout, strings))
}

fn lane_len(count: u32, width: usize, context: &'static str) -> Result<usize> {
    (count as usize)
        .checked_mul(width)
        .ok_or(Kv3Error::UnexpectedEof {
            context,
            position: 0,
            needed: usize::MAX,
            available: 0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(blob_bytes: u32, ints: u32, doubles: u32) -> LaneCounts {
        LaneCounts {
            blob_bytes,
            ints,
            doubles,
        }
    }

    #[test]
    fn layout_without_lanes() {
        let payload = [1, 0, 0, 0, b'r', b'o', b'o', b't'];
        let (layout, strings) = lay_out(&payload, counts(0, 0, 0)).unwrap();
        assert_eq!(strings, vec!["root".to_string()]);
        assert_eq!(layout.structural_start, 4);
        assert_eq!(layout.double_start, 4);
        assert_eq!(layout.types_start, 8);
        assert_eq!(layout.types_end, 8);
    }

    #[test]
    fn blob_lane_pads_to_next_boundary() {
        // 3 blob bytes -> string count at 4
        let mut payload = vec![0xAA, 0xBB, 0xCC, 0x00];
        payload.extend_from_slice(&0u32.to_le_bytes());
        let (layout, _) = lay_out(&payload, counts(3, 0, 0)).unwrap();
        assert_eq!(layout.blob_end, 3);
        assert_eq!(layout.structural_start, 8);

        // 4 blob bytes, already aligned -> still moves a full word
        let mut payload = vec![0u8; 8];
        payload.extend_from_slice(&0u32.to_le_bytes());
        let (layout, _) = lay_out(&payload, counts(4, 0, 0)).unwrap();
        assert_eq!(layout.structural_start, 12);
    }

    #[test]
    fn lanes_and_type_tags() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_le_bytes()); // string count
        payload.extend_from_slice(&[0u8; 8]); // 2 ints
        payload.extend_from_slice(&[0u8; 8]); // 1 double
        payload.extend_from_slice(b"name\0");
        payload.extend_from_slice(&[9, 1]); // type tags
        payload.extend_from_slice(&[0u8; 4]); // trailer

        let (layout, strings) = lay_out(&payload, counts(0, 2, 1)).unwrap();
        assert_eq!(strings, vec!["name".to_string()]);
        assert_eq!(layout.int_start, 4);
        assert_eq!(layout.double_start, 12);
        assert_eq!(layout.double_end, 20);
        assert_eq!(layout.types_start, 25);
        assert_eq!(layout.types_end, 27);
    }

    #[test]
    fn lanes_past_payload_end_fail() {
        let payload = 0u32.to_le_bytes();
        assert!(matches!(
            lay_out(&payload, counts(0, 0, 4)),
            Err(Kv3Error::UnexpectedEof { .. })
        ));
        assert!(matches!(
            lay_out(&payload, counts(16, 0, 0)),
            Err(Kv3Error::UnexpectedEof { .. })
        ));
    }
}
