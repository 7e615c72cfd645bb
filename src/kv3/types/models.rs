//! Core data structures for KV3 block components.
//!
//! This module defines the wire-level enumerations and fixed identifiers
//! shared by both on-disk revisions, plus the small configuration and
//! addressing types used by the reader.

use super::error::{Kv3Error, Result};

/// Magic of the legacy revision (`VKV\x03`).
pub const LEGACY_SIGNATURE: [u8; 4] = [0x56, 0x4B, 0x56, 0x03];

/// Magic of the current revision (`\x013VK`).
pub const CURRENT_SIGNATURE: [u8; 4] = [0x01, 0x33, 0x56, 0x4B];

/// Encoding identifier required by the legacy revision.
pub const LEGACY_ENCODING: [u8; 16] = [
    0x46, 0x1A, 0x79, 0x95, 0xBC, 0x95, 0x6C, 0x4F, 0xA7, 0x0B, 0x05, 0xBC, 0xA1, 0xB7, 0xDF, 0xD2,
];

/// Format identifier. Both revisions carry the same bytes.
pub const FORMAT_GUID: [u8; 16] = [
    0x7C, 0x16, 0x12, 0x74, 0xE9, 0x06, 0x98, 0x46, 0xAF, 0xF2, 0xE6, 0x3E, 0xB5, 0x90, 0x37, 0xE7,
];

/// Key under which the current revision's root object is returned.
pub const CURRENT_ROOT_KEY: &str = "PermModelData_t";

/// Name given to values whose name index is `-1`.
pub const UNNAMED_KEY: &str = "ERROR";

/// On-disk revision of a KV3 block, selected by its signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    Legacy,
    Current,
}

impl Revision {
    /// Maps a 4-byte magic to its revision.
    pub fn detect(signature: [u8; 4]) -> Result<Self> {
        match signature {
            LEGACY_SIGNATURE => Ok(Self::Legacy),
            CURRENT_SIGNATURE => Ok(Self::Current),
            other => Err(Kv3Error::UnknownSignature(other)),
        }
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Revision::Legacy => write!(f, "legacy"),
            Revision::Current => write!(f, "current"),
        }
    }
}

/// Payload compression used by the current revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Block,
}

impl TryFrom<u32> for CompressionMethod {
    type Error = Kv3Error;
    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Stored),
            1 => Ok(Self::Block),
            _ => Err(Kv3Error::UnsupportedCompression(value)),
        }
    }
}

/// Wire type byte of a value, after the resource-flag bit is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvType {
    StringMulti = 0,
    Null = 1,
    Boolean = 2,
    Int64 = 3,
    UInt64 = 4,
    Double = 5,
    String = 6,
    BinaryBlob = 7,
    Array = 8,
    Object = 9,
    ArrayTyped = 10,
    Int32 = 11,
    UInt32 = 12,
    BooleanTrue = 13,
    BooleanFalse = 14,
    Int64Zero = 15,
    Int64One = 16,
    DoubleZero = 17,
    DoubleOne = 18,
}

impl TryFrom<u8> for KvType {
    type Error = Kv3Error;
    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::StringMulti,
            1 => Self::Null,
            2 => Self::Boolean,
            3 => Self::Int64,
            4 => Self::UInt64,
            5 => Self::Double,
            6 => Self::String,
            7 => Self::BinaryBlob,
            8 => Self::Array,
            9 => Self::Object,
            10 => Self::ArrayTyped,
            11 => Self::Int32,
            12 => Self::UInt32,
            13 => Self::BooleanTrue,
            14 => Self::BooleanFalse,
            15 => Self::Int64Zero,
            16 => Self::Int64One,
            17 => Self::DoubleZero,
            18 => Self::DoubleOne,
            _ => return Err(Kv3Error::UnsupportedType(value)),
        })
    }
}

/// Per-value marker distinguishing plain values from resource references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KvFlag {
    #[default]
    Nothing,
    Resource,
    DeferredResource,
}

impl TryFrom<u8> for KvFlag {
    type Error = Kv3Error;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Nothing),
            1 => Ok(Self::Resource),
            2 => Ok(Self::DeferredResource),
            _ => Err(Kv3Error::InvalidFlag(value)),
        }
    }
}

/// Location of one KV3 block inside a larger file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    /// Absolute byte offset of the block's signature.
    pub offset: u64,
    /// Length of the block in bytes.
    pub length: u64,
}

impl BlockRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[{:#x}, +{}]", self.offset, self.length)
    }
}

/// Default bound on object/array nesting.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Default bound on the number of values decoded from one block.
pub const DEFAULT_MAX_VALUES: usize = 1 << 22;

/// Settings that control a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Maximum nesting of arrays and objects before decoding fails.
    pub max_depth: usize,
    /// Maximum number of values in one document before decoding fails.
    pub max_values: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_values: DEFAULT_MAX_VALUES,
        }
    }
}

impl DecodeOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_values(mut self, max_values: usize) -> Self {
        self.max_values = max_values;
        self
    }
}
