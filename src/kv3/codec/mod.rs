//! Codec layer for the two KV3 compression schemes.
//!
//! # Submodules
//!
//! - [`lzss`][]: Inline back-reference decompression used by legacy blocks
//! - [`block`][]: Pluggable block decompressor (LZ4 by default) used by
//!   current-revision blocks

pub mod block;
pub mod lzss;
