//! Bounds-checked little-endian reader over a borrowed payload.

use crate::error::DecodeError;

pub(crate) struct PayloadCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PayloadCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Unconsumed bytes, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    pub fn read_bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                field,
                needed: len,
                have: self.remaining(),
            });
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn read_i32(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        let b = self.read_bytes(4, field)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&mut self, field: &'static str) -> Result<i64, DecodeError> {
        let b = self.read_bytes(8, field)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(i64::from_le_bytes(buf))
    }

    /// Read up to (not including) the next NUL and step past it.
    ///
    /// Returns `None` and leaves the cursor untouched when no NUL follows.
    pub fn read_cstring(&mut self) -> Option<&'a [u8]> {
        let rest = self.rest();
        let nul = rest.iter().position(|&b| b == 0)?;
        self.offset += nul + 1;
        Some(&rest[..nul])
    }

    pub fn skip(&mut self, len: usize, field: &'static str) -> Result<(), DecodeError> {
        self.read_bytes(len, field).map(|_| ())
    }
}
