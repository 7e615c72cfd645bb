//! Low-level byte reading utilities

use byteorder::{ByteOrder, LittleEndian};

use crate::kv3::types::error::{Kv3Error, Result};

/// A bounded little-endian reader over a region of a byte slice.
///
/// Positions are absolute offsets into the underlying slice, so a cursor
/// restricted to a lane still reports the same offsets as the layout that
/// produced it. Reads never leave `[start, end)`.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    start: usize,
    pos: usize,
    end: usize,
    context: &'static str,
}

impl<'a> ByteCursor<'a> {
    /// A cursor over the whole slice.
    pub fn new(data: &'a [u8], context: &'static str) -> Self {
        Self {
            data,
            start: 0,
            pos: 0,
            end: data.len(),
            context,
        }
    }

    /// A cursor over `data[start..end]`, positioned at `start`.
    pub fn region(data: &'a [u8], start: usize, end: usize, context: &'static str) -> Result<Self> {
        if start > end || end > data.len() {
            return Err(Kv3Error::UnexpectedEof {
                context,
                position: start,
                needed: end.saturating_sub(start),
                available: data.len().saturating_sub(start),
            });
        }
        Ok(Self {
            data,
            start,
            pos: start,
            end,
            context,
        })
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Moves to an absolute position inside the cursor's region.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos < self.start || pos > self.end {
            return Err(self.eof(pos.saturating_sub(self.pos)));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.end
    }

    /// Returns the next `count` bytes and advances past them.
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(self.eof(count));
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Returns everything up to the end of the region.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.pos..self.end];
        self.pos = self.end;
        bytes
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    /// Reads a NUL-terminated string.
    ///
    /// A string that reaches the end of the region without a terminator ends
    /// there. Bytes are decoded as lossy UTF-8.
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..self.end];
        let (text, consumed) = match rest.iter().position(|&b| b == 0) {
            Some(nul) => (&rest[..nul], nul + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    fn eof(&self, needed: usize) -> Kv3Error {
        Kv3Error::UnexpectedEof {
            context: self.context,
            position: self.pos,
            needed,
            available: self.remaining(),
        }
    }
}
