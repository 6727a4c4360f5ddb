//! Wire codecs shared by the geohist block and page formats.
//!
//! Two numeric encodings are supported across the full 32- and 64-bit
//! ranges:
//!
//! - **unsigned varint**: little-endian base-128, 7 payload bits per byte,
//!   high bit set on every byte except the last
//! - **zigzag varint**: a signed value mapped to unsigned via
//!   `(n << 1) ^ (n >> 63)`, then written as an unsigned varint
//!
//! Readers track their byte offset so every failure names the position of
//! the field that could not be decoded.

use std::io::{self, Read, Write};

use byteorder::ReadBytesExt;
use thiserror::Error;

mod reader;

pub use reader::{BlockReader, BlockWriter};

/// Longest possible encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Reason a buffer could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    #[error("unexpected end of buffer")]
    Truncated,
    #[error("varint continues past {MAX_VARINT_LEN} bytes")]
    VarIntTooLong,
    #[error("value does not fit in {bits} bits")]
    Overflow { bits: u32 },
    #[error("unknown flag bits {0:#04x}")]
    UnknownFlags(u8),
    #[error("invalid value: {0}")]
    Invalid(&'static str),
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

/// A decode failure anchored at a byte offset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at offset {offset}")]
pub struct DecodeError {
    pub offset: usize,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    #[must_use]
    pub const fn new(offset: usize, kind: DecodeErrorKind) -> Self {
        Self { offset, kind }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

// Zigzag mapping

#[inline]
#[must_use]
pub const fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
#[must_use]
pub const fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Encode `value` into a fixed scratch buffer, returning the used length.
#[inline]
#[must_use]
pub fn uvarint_bytes(mut value: u64) -> ([u8; MAX_VARINT_LEN], usize) {
    let mut out = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out[len] = byte;
            return (out, len + 1);
        }
        out[len] = byte | 0x80;
        len += 1;
    }
}

/// Number of bytes `value` occupies as an unsigned varint.
#[inline]
#[must_use]
pub const fn uvarint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

// Unsigned varint

pub fn write_uvarint<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    let (bytes, len) = uvarint_bytes(value);
    writer.write_all(&bytes[..len])
}

/// Reads an unsigned varint. A tenth byte carrying more than the top bit
/// of a `u64` fails with [`DecodeErrorKind::Overflow`]; a tenth byte that
/// is otherwise valid but still continues fails with
/// [`DecodeErrorKind::VarIntTooLong`].
pub fn read_uvarint<R: Read>(reader: &mut R) -> Result<u64, DecodeErrorKind> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = reader.read_u8().map_err(|_| DecodeErrorKind::Truncated)?;
        let bits = u64::from(byte & 0x7F);
        if shift == 63 && bits > 1 {
            return Err(DecodeErrorKind::Overflow { bits: 64 });
        }
        result |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift > 63 {
            return Err(DecodeErrorKind::VarIntTooLong);
        }
    }
}

pub fn write_uvarint32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    write_uvarint(writer, u64::from(value))
}

pub fn read_uvarint32<R: Read>(reader: &mut R) -> Result<u32, DecodeErrorKind> {
    let value = read_uvarint(reader)?;
    u32::try_from(value).map_err(|_| DecodeErrorKind::Overflow { bits: 32 })
}

// Zigzag varint

pub fn write_svarint<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    write_uvarint(writer, zigzag_encode(value))
}

pub fn read_svarint<R: Read>(reader: &mut R) -> Result<i64, DecodeErrorKind> {
    read_uvarint(reader).map(zigzag_decode)
}

/// 32-bit values share the 64-bit mapping: sign extension then zigzag
/// yields the same bytes as a native 32-bit zigzag.
pub fn write_svarint32<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    write_svarint(writer, i64::from(value))
}

pub fn read_svarint32<R: Read>(reader: &mut R) -> Result<i32, DecodeErrorKind> {
    let value = read_svarint(reader)?;
    i32::try_from(value).map_err(|_| DecodeErrorKind::Overflow { bits: 32 })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn roundtrip_u64(value: u64) -> u64 {
        let mut buf = Vec::new();
        write_uvarint(&mut buf, value).unwrap();
        assert_eq!(buf.len(), uvarint_len(value));
        read_uvarint(&mut Cursor::new(&buf)).unwrap()
    }

    fn roundtrip_i64(value: i64) -> i64 {
        let mut buf = Vec::new();
        write_svarint(&mut buf, value).unwrap();
        read_svarint(&mut Cursor::new(&buf)).unwrap()
    }

    #[test]
    fn test_unsigned_boundaries() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u64::from(u32::MAX), u64::MAX] {
            assert_eq!(roundtrip_u64(value), value);
        }
        for value in [0, 1, u32::MAX] {
            let mut buf = Vec::new();
            write_uvarint32(&mut buf, value).unwrap();
            assert_eq!(read_uvarint32(&mut Cursor::new(&buf)).unwrap(), value);
        }
    }

    #[test]
    fn test_signed_boundaries() {
        for value in [0, -1, 1, i64::MIN, i64::MAX, i64::from(i32::MIN), i64::from(i32::MAX)] {
            assert_eq!(roundtrip_i64(value), value);
        }
        for value in [0, -1, 1, i32::MIN, i32::MAX] {
            let mut buf = Vec::new();
            write_svarint32(&mut buf, value).unwrap();
            assert_eq!(read_svarint32(&mut Cursor::new(&buf)).unwrap(), value);
        }
    }

    #[test]
    fn test_zigzag_mapping() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(i64::MAX), u64::MAX - 1);
        assert_eq!(zigzag_encode(i64::MIN), u64::MAX);
        assert_eq!(zigzag_decode(u64::MAX), i64::MIN);
    }

    #[test]
    fn test_max_length_encoding() {
        let mut buf = Vec::new();
        write_uvarint(&mut buf, u64::MAX).unwrap();
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(*buf.last().unwrap(), 0x01);
    }

    #[test]
    fn test_truncated() {
        let buf = [0x80u8, 0x80];
        assert_eq!(
            read_uvarint(&mut Cursor::new(&buf[..])),
            Err(DecodeErrorKind::Truncated)
        );
    }

    #[test]
    fn test_too_long() {
        let mut buf = vec![0xFFu8; 9];
        buf.extend([0x81, 0x00]);
        assert_eq!(
            read_uvarint(&mut Cursor::new(&buf[..])),
            Err(DecodeErrorKind::VarIntTooLong)
        );

        // Payload overflow on the tenth byte is reported before its
        // continuation bit.
        let buf = [0xFFu8; 11];
        assert_eq!(
            read_uvarint(&mut Cursor::new(&buf[..])),
            Err(DecodeErrorKind::Overflow { bits: 64 })
        );
    }

    #[test]
    fn test_tenth_byte_overflow() {
        let mut buf = vec![0xFFu8; 9];
        buf.push(0x02);
        assert_eq!(
            read_uvarint(&mut Cursor::new(&buf[..])),
            Err(DecodeErrorKind::Overflow { bits: 64 })
        );
    }

    #[test]
    fn test_32_bit_overflow_is_an_error() {
        let mut buf = Vec::new();
        write_uvarint(&mut buf, u64::from(u32::MAX) + 1).unwrap();
        assert_eq!(
            read_uvarint32(&mut Cursor::new(&buf)),
            Err(DecodeErrorKind::Overflow { bits: 32 })
        );

        let mut buf = Vec::new();
        write_svarint(&mut buf, i64::from(i32::MIN) - 1).unwrap();
        assert_eq!(
            read_svarint32(&mut Cursor::new(&buf)),
            Err(DecodeErrorKind::Overflow { bits: 32 })
        );
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn unsigned_roundtrip(value in any::<u64>()) {
                prop_assert_eq!(roundtrip_u64(value), value);
            }

            #[test]
            fn signed_roundtrip(value in any::<i64>()) {
                prop_assert_eq!(roundtrip_i64(value), value);
            }
        }
    }
}
