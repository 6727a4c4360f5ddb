//! Offset-tracking cursor over an immutable byte buffer, and its writing
//! counterpart.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
    DecodeError, DecodeErrorKind, DecodeResult, read_svarint, read_svarint32, read_uvarint,
    read_uvarint32, uvarint_bytes, zigzag_encode,
};

/// Reads fields from a block, attaching the field's start offset to every
/// failure.
pub struct BlockReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> BlockReader<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Current byte offset.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.offset())
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Build an error at the current offset.
    #[must_use]
    pub fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(self.offset(), kind)
    }

    fn field<T>(
        &mut self,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> Result<T, DecodeErrorKind>,
    ) -> DecodeResult<T> {
        let offset = self.offset();
        read(&mut self.cursor).map_err(|kind| DecodeError::new(offset, kind))
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        self.field(|c| c.read_u8().map_err(|_| DecodeErrorKind::Truncated))
    }

    pub fn read_uvarint(&mut self) -> DecodeResult<u64> {
        self.field(read_uvarint)
    }

    pub fn read_uvarint32(&mut self) -> DecodeResult<u32> {
        self.field(read_uvarint32)
    }

    pub fn read_svarint(&mut self) -> DecodeResult<i64> {
        self.field(read_svarint)
    }

    pub fn read_svarint32(&mut self) -> DecodeResult<i32> {
        self.field(read_svarint32)
    }

    pub fn read_i64_le(&mut self) -> DecodeResult<i64> {
        self.field(|c| {
            c.read_i64::<LittleEndian>()
                .map_err(|_| DecodeErrorKind::Truncated)
        })
    }

    /// Read a length prefix, rejecting counts that cannot possibly fit in
    /// the remaining bytes (each element takes at least `min_element_len`).
    pub fn read_count(&mut self, min_element_len: usize) -> DecodeResult<usize> {
        let offset = self.offset();
        let count = self.read_uvarint()?;
        let count = usize::try_from(count)
            .map_err(|_| DecodeError::new(offset, DecodeErrorKind::Overflow { bits: 64 }))?;
        if min_element_len > 0 && count.saturating_mul(min_element_len) > self.remaining() {
            return Err(DecodeError::new(offset, DecodeErrorKind::Truncated));
        }
        Ok(count)
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        let offset = self.offset();
        if len > self.remaining() {
            return Err(DecodeError::new(offset, DecodeErrorKind::Truncated));
        }
        let bytes: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((offset + len) as u64);
        Ok(&bytes[offset..offset + len])
    }

    /// Require that the whole buffer was consumed.
    pub fn finish(self) -> DecodeResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(self.error(DecodeErrorKind::TrailingBytes(n))),
        }
    }
}

/// Append-only encoder. Writing into memory cannot fail, so these methods
/// are infallible.
#[derive(Debug, Default)]
pub struct BlockWriter {
    buf: Vec<u8>,
}

impl BlockWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    #[inline]
    pub fn put_uvarint(&mut self, value: u64) {
        let (bytes, len) = uvarint_bytes(value);
        self.buf.extend_from_slice(&bytes[..len]);
    }

    #[inline]
    pub fn put_svarint(&mut self, value: i64) {
        self.put_uvarint(zigzag_encode(value));
    }

    #[inline]
    pub fn put_i64_le(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
