//! Core KV3 reader module

pub mod codec;
pub mod format;
pub mod reader;
pub mod types;
pub mod utils;

pub use codec::block::{BlockDecompressor, Lz4BlockDecompressor};
pub use format::{decode, decode_with};
pub use reader::Kv3Reader;
pub use types::error::{ErrorKind, Kv3Error, Result};
pub use types::models::{BlockRange, DecodeOptions, KvFlag, KvType, Revision};
pub use types::node::{Kv3Document, Node, Object, Value};
