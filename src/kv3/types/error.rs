//! Custom error types for the kv3-reader crate.

use thiserror::Error;

/// Broad category of a [`Kv3Error`].
///
/// Callers decoding many blocks usually only need to know whether a block is
/// foreign (format), uses a feature this reader does not handle (unsupported),
/// or is damaged (decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    UnsupportedFormat,
    Decode,
}

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum Kv3Error {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The block does not start with a known KV3 magic.
    #[error("Unknown KV3 signature: {0:02x?}")]
    UnknownSignature([u8; 4]),

    /// A fixed 16-byte identifier in the block header does not match.
    #[error("Unrecognized KV3 {field}: {found:02x?}")]
    ConstantMismatch {
        field: &'static str,
        found: [u8; 16],
    },

    /// The current-revision header names a compression method we cannot decode.
    #[error("Unsupported KV3 compression method: {0}")]
    UnsupportedCompression(u32),

    /// A type byte has no decoding rule.
    #[error("Unsupported KV3 value type: {0}")]
    UnsupportedType(u8),

    /// The external block decompressor failed.
    #[error("Decompression failed: {0}")]
    DecompressionError(String),

    /// A buffer has an unexpected size after an operation.
    #[error("Size mismatch for {context}: expected {expected} bytes, but found {found} bytes")]
    SizeMismatch {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    /// A string-table reference points outside the table.
    #[error("String index {index} out of range (table has {len} entries)")]
    StringIndexOutOfRange { index: i32, len: usize },

    /// A legacy back-reference points before the start of the output.
    #[error("Back-reference offset {offset} exceeds {produced} bytes produced so far")]
    BackReferenceOutOfRange { offset: usize, produced: usize },

    /// A read ran past the end of its buffer or lane.
    #[error(
        "Unexpected end of {context}: needed {needed} bytes at {position}, {available} available"
    )]
    UnexpectedEof {
        context: &'static str,
        position: usize,
        needed: usize,
        available: usize,
    },

    /// The resource flag byte is not one of the known values.
    #[error("Invalid resource flag: {0}")]
    InvalidFlag(u8),

    /// The document nests deeper than the configured limit.
    #[error("Document nesting exceeds the maximum depth of {0}")]
    NestingTooDeep(usize),

    /// The document holds more values than the configured limit.
    #[error("Document exceeds the maximum of {0} values")]
    TooManyValues(usize),

    /// A mutex lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A mutex lock was poisoned, indicating a panic in another thread holding the lock.")]
    LockPoisoned,
}

impl Kv3Error {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Kv3Error::Io(_) | Kv3Error::LockPoisoned => ErrorKind::Io,
            Kv3Error::UnknownSignature(_) | Kv3Error::ConstantMismatch { .. } => ErrorKind::Format,
            Kv3Error::UnsupportedCompression(_) | Kv3Error::UnsupportedType(_) => {
                ErrorKind::UnsupportedFormat
            }
            Kv3Error::DecompressionError(_)
            | Kv3Error::SizeMismatch { .. }
            | Kv3Error::StringIndexOutOfRange { .. }
            | Kv3Error::BackReferenceOutOfRange { .. }
            | Kv3Error::UnexpectedEof { .. }
            | Kv3Error::InvalidFlag(_)
            | Kv3Error::NestingTooDeep(_)
            | Kv3Error::TooManyValues(_) => ErrorKind::Decode,
        }
    }
}

/// A convenience `Result` type alias using the crate's `Kv3Error` type.
pub type Result<T> = std::result::Result<T, Kv3Error>;
