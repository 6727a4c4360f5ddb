//! Dense and sparse index pages.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use geohist_protocol::{BlockReader, BlockWriter, DecodeError, DecodeErrorKind};

use crate::{ABSENT, Bitmap, IndexError, IndexResult, PageEncodingPolicy};

/// Present values between two sparse-page checkpoints.
const CHECKPOINT_INTERVAL: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageEncoding {
    Dense,
    Sparse,
}

impl fmt::Display for PageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
        })
    }
}

/// A flat slot array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DensePage {
    values: Box<[i64]>,
}

impl DensePage {
    #[must_use]
    pub fn get(&self, offset: u32) -> i64 {
        self.values.get(offset as usize).copied().unwrap_or(ABSENT)
    }

    fn to_bytes(&self) -> Bytes {
        let mut buf = vec![0u8; self.values.len() * 8];
        LittleEndian::write_i64_into(&self.values, &mut buf);
        Bytes::from(buf)
    }
}

/// Restart point for delta decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Checkpoint {
    value: i64,
    /// Byte position just after this value's delta.
    next: usize,
}

/// Occupancy bitmap plus zigzag deltas of the present values in slot order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SparsePage {
    bitmap: Bitmap,
    deltas: Bytes,
    checkpoints: Box<[Checkpoint]>,
}

impl SparsePage {
    /// Build from a bitmap and the present values in ascending slot order,
    /// accumulating each delta against the previous value.
    pub fn from_values(bitmap: Bitmap, values: impl IntoIterator<Item = i64>) -> IndexResult<Self> {
        let expected = bitmap.count_ones() as usize;
        let mut writer = BlockWriter::new();
        let mut checkpoints = Vec::with_capacity(expected.div_ceil(CHECKPOINT_INTERVAL as usize));
        let mut previous = 0i64;
        let mut count = 0usize;
        for value in values {
            writer.put_svarint(value.wrapping_sub(previous));
            if count % CHECKPOINT_INTERVAL as usize == 0 {
                checkpoints.push(Checkpoint {
                    value,
                    next: writer.len(),
                });
            }
            previous = value;
            count += 1;
        }
        if count != expected {
            return Err(IndexError::Config("sparse value count differs from bitmap"));
        }
        Ok(Self {
            bitmap,
            deltas: Bytes::from(writer.into_inner()),
            checkpoints: checkpoints.into_boxed_slice(),
        })
    }

    /// Value at `offset`, or [`ABSENT`]. Errors carry the byte offset into
    /// the delta stream.
    pub fn get(&self, offset: u32) -> Result<i64, DecodeError> {
        if !self.bitmap.get(offset) {
            return Ok(ABSENT);
        }
        let rank = self.bitmap.rank(offset);
        let Some(checkpoint) = self.checkpoints.get((rank / CHECKPOINT_INTERVAL) as usize) else {
            return Err(DecodeError::new(0, DecodeErrorKind::Invalid("missing delta checkpoint")));
        };
        let mut reader = BlockReader::new(&self.deltas);
        reader.read_bytes(checkpoint.next)?;
        let mut value = checkpoint.value;
        for _ in 0..rank % CHECKPOINT_INTERVAL {
            value = value.wrapping_add(reader.read_svarint()?);
        }
        Ok(value)
    }

    #[must_use]
    pub fn len(&self) -> u32 {
        self.bitmap.count_ones()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_bytes(&self) -> Bytes {
        let mut writer = BlockWriter::with_capacity(
            self.bitmap.as_bytes().len() + 5 + self.deltas.len(),
        );
        writer.put_bytes(self.bitmap.as_bytes());
        writer.put_uvarint(u64::from(self.len()));
        writer.put_bytes(&self.deltas);
        Bytes::from(writer.into_inner())
    }

    fn from_bytes(page_size: u32, bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = BlockReader::new(bytes);
        let bitmap_bytes = reader.read_bytes(Bitmap::byte_len(page_size))?;
        let bitmap = Bitmap::from_bytes(bitmap_bytes, page_size)
            .ok_or_else(|| reader.error(DecodeErrorKind::Invalid("bitmap padding bits set")))?;

        let count_offset = reader.offset();
        let count = reader.read_count(1)?;
        if count != bitmap.count_ones() as usize {
            return Err(DecodeError::new(
                count_offset,
                DecodeErrorKind::Invalid("present count differs from bitmap"),
            ));
        }

        let start = reader.offset();
        let mut checkpoints = Vec::with_capacity(count.div_ceil(CHECKPOINT_INTERVAL as usize));
        let mut value = 0i64;
        for i in 0..count {
            value = value.wrapping_add(reader.read_svarint()?);
            if i % CHECKPOINT_INTERVAL as usize == 0 {
                checkpoints.push(Checkpoint {
                    value,
                    next: reader.offset() - start,
                });
            }
        }
        reader.finish()?;

        Ok(Self {
            bitmap,
            deltas: Bytes::copy_from_slice(&bytes[start..]),
            checkpoints: checkpoints.into_boxed_slice(),
        })
    }
}

/// One decoded page. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexPage {
    Dense(DensePage),
    Sparse(SparsePage),
}

impl IndexPage {
    /// Build a page from `(slot, value)` entries in strictly ascending slot
    /// order, choosing the layout by `policy`.
    pub fn build(page_size: u32, entries: &[(u32, i64)], policy: PageEncodingPolicy) -> IndexResult<Self> {
        let mut previous: Option<u32> = None;
        for &(offset, value) in entries {
            if offset >= page_size {
                return Err(IndexError::SlotOutOfRange { offset, page_size });
            }
            if let Some(previous) = previous.filter(|&p| p >= offset) {
                return Err(IndexError::UnsortedKey {
                    previous: u64::from(previous),
                    key: u64::from(offset),
                });
            }
            if value == ABSENT {
                return Err(IndexError::ReservedValue {
                    key: u64::from(offset),
                });
            }
            previous = Some(offset);
        }

        let occupancy = entries.len() as f64 / f64::from(page_size);
        if let PageEncodingPolicy::DenseAbove(threshold) = policy {
            if occupancy > threshold {
                return Ok(Self::dense(page_size, entries));
            }
        }

        let bitmap = Bitmap::from_positions(page_size, entries.iter().map(|&(offset, _)| offset));
        let sparse = SparsePage::from_values(bitmap, entries.iter().map(|&(_, value)| value))?;
        if sparse.encoded_len() < Self::dense_len(page_size) {
            Ok(Self::Sparse(sparse))
        } else {
            Ok(Self::dense(page_size, entries))
        }
    }

    fn dense(page_size: u32, entries: &[(u32, i64)]) -> Self {
        let mut values = vec![ABSENT; page_size as usize];
        for &(offset, value) in entries {
            values[offset as usize] = value;
        }
        Self::Dense(DensePage {
            values: values.into_boxed_slice(),
        })
    }

    const fn dense_len(page_size: u32) -> usize {
        page_size as usize * 8
    }

    /// Decode stored bytes. The layout is identified by length: exactly
    /// `page_size * 8` bytes is dense, anything shorter is sparse.
    pub fn from_bytes(page: u64, page_size: u32, bytes: &[u8]) -> IndexResult<Self> {
        let dense_len = Self::dense_len(page_size);
        if bytes.len() == dense_len {
            let mut values = vec![0i64; page_size as usize];
            LittleEndian::read_i64_into(bytes, &mut values);
            return Ok(Self::Dense(DensePage {
                values: values.into_boxed_slice(),
            }));
        }
        if bytes.len() > dense_len {
            return Err(IndexError::PageLength {
                page,
                len: bytes.len(),
            });
        }
        SparsePage::from_bytes(page_size, bytes)
            .map(Self::Sparse)
            .map_err(|source| IndexError::PageDecode { page, source })
    }

    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Dense(page) => page.to_bytes(),
            Self::Sparse(page) => page.to_bytes(),
        }
    }

    /// Value at `offset`, or [`ABSENT`]. Only a sparse page with a corrupt
    /// delta stream fails.
    pub fn get(&self, offset: u32) -> Result<i64, DecodeError> {
        match self {
            Self::Dense(page) => Ok(page.get(offset)),
            Self::Sparse(page) => page.get(offset),
        }
    }

    #[must_use]
    pub const fn encoding(&self) -> PageEncoding {
        match self {
            Self::Dense(_) => PageEncoding::Dense,
            Self::Sparse(_) => PageEncoding::Sparse,
        }
    }

    /// Present `(slot, value)` pairs in ascending slot order.
    pub fn entries(&self) -> Result<Vec<(u32, i64)>, DecodeError> {
        match self {
            Self::Dense(page) => Ok(page
                .values
                .iter()
                .enumerate()
                .filter(|&(_, &value)| value != ABSENT)
                .map(|(offset, &value)| (offset as u32, value))
                .collect()),
            Self::Sparse(page) => {
                let mut reader = BlockReader::new(&page.deltas);
                let mut value = 0i64;
                page.bitmap
                    .ones()
                    .map(|offset| {
                        value = value.wrapping_add(reader.read_svarint()?);
                        Ok((offset, value))
                    })
                    .collect()
            }
        }
    }
}

impl SparsePage {
    fn encoded_len(&self) -> usize {
        self.bitmap.as_bytes().len()
            + geohist_protocol::uvarint_len(u64::from(self.len()))
            + self.deltas.len()
    }
}
