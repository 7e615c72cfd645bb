//! Assembler for legacy (`VKV\x03`) blocks.
//!
//! ```text
//! [16 bytes] encoding id
//! [16 bytes] format id
//! [ 4 bytes] flags: bytes 0..3 = decompressed size (24-bit LE),
//!            byte 3 bit 7 = stored uncompressed
//! [ rest   ] back-reference stream, or the raw buffer when stored
//! ```
//!
//! The assembled buffer holds the string table followed by the structural
//! data, with every scalar inline.

use log::{debug, info, warn};

use crate::kv3::codec::lzss;
use crate::kv3::types::error::Result;
use crate::kv3::types::models::{DecodeOptions, Revision, FORMAT_GUID, LEGACY_ENCODING};
use crate::kv3::types::node::Kv3Document;
use crate::kv3::utils::ByteCursor;

use super::value::DecodeContext;
use super::{expect_constant, read_strings};

const STORED_FLAG: u8 = 0x80;

/// Decodes a legacy block. `block` is positioned just after the signature.
pub fn decode(block: &mut ByteCursor<'_>, options: &DecodeOptions) -> Result<Kv3Document> {
    info!("Decoding legacy KV3 block ({} bytes after signature)", block.remaining());

    expect_constant(block, "encoding", &LEGACY_ENCODING)?;
    expect_constant(block, "format", &FORMAT_GUID)?;

    let flags = block.read_array::<4>()?;
    let target = u32::from_le_bytes([flags[0], flags[1], flags[2], 0]) as usize;

    let buffer = if flags[3] & STORED_FLAG != 0 {
        let stored = block.take_rest();
        debug!("Legacy block is stored uncompressed ({} bytes)", stored.len());
        if stored.len() != target {
            warn!(
                "Stored legacy block is {} bytes but its header declares {}",
                stored.len(),
                target
            );
        }
        stored.to_vec()
    } else {
        debug!("Decompressing legacy block to {} bytes", target);
        lzss::decompress(block, target)?
    };

    let mut cursor = ByteCursor::new(&buffer, "legacy buffer");
    let string_count = cursor.read_u32()?;
    let strings = read_strings(&mut cursor, string_count)?;
    debug!(
        "Legacy string table: {} strings, structural data at {:#x}",
        strings.len(),
        cursor.tell()
    );

    let root = DecodeContext::new(cursor, &strings, options.max_depth)
        .with_max_values(options.max_values)
        .parse_root()?;

    info!("Legacy KV3 block decoded: {} strings", strings.len());
    Ok(Kv3Document {
        revision: Revision::Legacy,
        strings,
        root,
    })
}
