//! # kv3-reader
//!
//! A reader for binary KV3 blocks, the structured-value container embedded in
//! compiled resource files.
//! Supports the legacy revision (inline back-reference compression) and the
//! current revision (split data lanes, optional LZ4 block compression).
//!
//! ```no_run
//! use kv3_reader::{BlockRange, DecodeOptions, Kv3Reader};
//!
//! let reader = Kv3Reader::open("model.vmdl_c", DecodeOptions::default()).unwrap();
//! let doc = reader.read_block(BlockRange::new(0x40, 0x1200)).unwrap();
//! println!("{}", serde_json::to_string_pretty(&doc.root).unwrap());
//! ```
pub mod kv3;

// Re-export the main types for convenience
pub use kv3::{
    decode, decode_with, BlockDecompressor, BlockRange, DecodeOptions, ErrorKind, Kv3Document,
    Kv3Error, Kv3Reader, KvFlag, KvType, Lz4BlockDecompressor, Node, Object, Result, Revision,
    Value,
};
