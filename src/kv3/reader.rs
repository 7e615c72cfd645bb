use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use log::{info, warn};

use super::codec::block::{BlockDecompressor, Lz4BlockDecompressor};
use super::format;
use super::types::error::{Kv3Error, Result};
use super::types::models::{BlockRange, DecodeOptions};
use super::types::node::Kv3Document;

/// Reads KV3 blocks out of a larger resource file.
///
/// The reader does not know where blocks live; the caller passes each block's
/// [`BlockRange`], usually taken from the container's own block table.
pub struct Kv3Reader {
    file: Mutex<File>,
    file_len: u64,
    options: DecodeOptions,
    decompressor: Box<dyn BlockDecompressor + Send + Sync>,
}

impl std::fmt::Debug for Kv3Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Kv3Reader")
            .field("file_len", &self.file_len)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Kv3Reader {
    /// Opens a resource file for block decoding.
    ///
    /// Current-revision blocks that use the block codec are decompressed as
    /// LZ4; see [`Kv3Reader::with_decompressor`] to plug in another codec.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or its size queried.
    pub fn open(path: impl AsRef<Path>, options: DecodeOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening resource file: {}", path.display());
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            file: Mutex::new(file),
            file_len,
            options,
            decompressor: Box::new(Lz4BlockDecompressor),
        })
    }

    /// Replaces the block codec used for compressed current-revision payloads.
    pub fn with_decompressor(
        mut self,
        decompressor: impl BlockDecompressor + Send + Sync + 'static,
    ) -> Self {
        self.decompressor = Box::new(decompressor);
        self
    }

    /// Size of the underlying file in bytes.
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Reads the raw bytes of one block.
    pub fn read_block_bytes(&self, range: BlockRange) -> Result<Vec<u8>> {
        let end = range.offset.checked_add(range.length);
        if end.map_or(true, |end| end > self.file_len) {
            return Err(Kv3Error::UnexpectedEof {
                context: "resource file",
                position: range.offset as usize,
                needed: range.length as usize,
                available: self.file_len.saturating_sub(range.offset) as usize,
            });
        }

        let mut file = self.file.lock().map_err(|_| Kv3Error::LockPoisoned)?;
        file.seek(SeekFrom::Start(range.offset))?;
        let mut bytes = vec![0u8; range.length as usize];
        file.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Reads and decodes one block.
    pub fn read_block(&self, range: BlockRange) -> Result<Kv3Document> {
        info!("Reading KV3 block {}", range);
        let bytes = self.read_block_bytes(range)?;
        format::decode_with(&bytes, &self.options, self.decompressor.as_ref())
    }

    /// Decodes several blocks, keeping failures local to their block.
    ///
    /// A block that fails to decode is logged and reported in its slot;
    /// the remaining blocks are still decoded.
    pub fn read_blocks<'a>(
        &'a self,
        ranges: &'a [BlockRange],
    ) -> impl Iterator<Item = (BlockRange, Result<Kv3Document>)> + 'a {
        ranges.iter().map(move |&range| {
            let result = self.read_block(range);
            if let Err(e) = &result {
                warn!("Skipping KV3 block {}: {}", range, e);
            }
            (range, result)
        })
    }
}
