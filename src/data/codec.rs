//! Byte-level helpers for the deterministic record formats.
//!
//! Node records and proofs use little-endian length prefixes throughout;
//! readers fail on truncation instead of panicking.

use crate::error::TrieError;

/// Cursor over a byte buffer with checked reads.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], TrieError> {
        if self.buf.len() < n {
            return Err(TrieError::Corrupted(format!(
                "unexpected end of data: need {n} bytes, have {}",
                self.buf.len()
            )));
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    pub fn take_u8(&mut self) -> Result<u8, TrieError> {
        Ok(self.take(1)?[0])
    }

    pub fn take_u16_le(&mut self) -> Result<u16, TrieError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Byte string with a one-byte length prefix.
    pub fn take_bytes8(&mut self) -> Result<&'a [u8], TrieError> {
        let len = self.take_u8()? as usize;
        self.take(len)
    }

    /// Byte string with a two-byte little-endian length prefix.
    pub fn take_bytes16(&mut self) -> Result<&'a [u8], TrieError> {
        let len = self.take_u16_le()? as usize;
        self.take(len)
    }

    /// Fails unless every byte has been consumed.
    pub fn finish(self) -> Result<(), TrieError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(TrieError::NotAllBytesConsumed)
        }
    }
}

pub(crate) fn put_u16_le(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_bytes8(out: &mut Vec<u8>, data: &[u8]) {
    debug_assert!(data.len() <= u8::MAX as usize);
    out.push(data.len() as u8);
    out.extend_from_slice(data);
}

pub(crate) fn put_bytes16(out: &mut Vec<u8>, data: &[u8]) {
    debug_assert!(data.len() <= u16::MAX as usize);
    put_u16_le(out, data.len() as u16);
    out.extend_from_slice(data);
}
