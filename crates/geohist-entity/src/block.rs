//! Encoded history blocks and their fixed header.

use bitflags::bitflags;
use bytes::Bytes;
use geohist_codes::CodeTable;
use geohist_protocol::{BlockReader, BlockWriter, DecodeError, DecodeErrorKind, DecodeResult};

use crate::{
    BlockResult, BoundingBox, Coordinate, EntityKind, EntityRef, Timestamp, VersionedEntity, codec,
};

pub(crate) const KIND_MASK: u8 = 0b0000_0011;

bitflags! {
    /// Header byte flags above the kind bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct HeaderFlags: u8 {
        const HAS_BOUNDS = 0b0000_0100;
    }

    /// Leading byte of every version record.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct RecordFlags: u8 {
        const VISIBLE = 0b0000_0001;
        const NEW_CHANGESET = 0b0000_0010;
        const NEW_USER = 0b0000_0100;
        const SAME_TAGS = 0b0000_1000;
        const SAME_MEMBERS = 0b0001_0000;
    }
}

/// Everything before the key table: identity, delta bases and bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub kind: EntityKind,
    pub id: i64,
    pub base_timestamp: Timestamp,
    pub base: Coordinate,
    pub bounds: Option<BoundingBox>,
}

impl BlockHeader {
    pub(crate) fn write(&self, writer: &mut BlockWriter) {
        let mut flags = HeaderFlags::empty();
        flags.set(HeaderFlags::HAS_BOUNDS, self.bounds.is_some());
        writer.put_u8(self.kind.as_raw() | flags.bits());
        writer.put_svarint(self.id);
        writer.put_uvarint(self.base_timestamp.as_secs());
        writer.put_svarint(i64::from(self.base.lon));
        writer.put_svarint(i64::from(self.base.lat));
        if let Some(bounds) = self.bounds {
            let (lon_extent, lat_extent) = bounds.extent();
            writer.put_uvarint(lon_extent);
            writer.put_uvarint(lat_extent);
        }
    }

    pub(crate) fn read(reader: &mut BlockReader<'_>) -> DecodeResult<Self> {
        let offset = reader.offset();
        let byte = reader.read_u8()?;
        let kind = EntityKind::from_raw(byte & KIND_MASK).ok_or(DecodeError::new(
            offset,
            DecodeErrorKind::Invalid("unknown entity kind"),
        ))?;
        let flags = HeaderFlags::from_bits(byte & !KIND_MASK).ok_or(DecodeError::new(
            offset,
            DecodeErrorKind::UnknownFlags(byte & !KIND_MASK & !HeaderFlags::all().bits()),
        ))?;

        let id = reader.read_svarint()?;
        let base_timestamp = Timestamp::from_secs(reader.read_uvarint()?);
        let base = Coordinate::new(reader.read_svarint32()?, reader.read_svarint32()?);

        let bounds = if flags.contains(HeaderFlags::HAS_BOUNDS) {
            let max_lon = offset_by(reader, base.lon)?;
            let max_lat = offset_by(reader, base.lat)?;
            Some(BoundingBox {
                min: base,
                max: Coordinate::new(max_lon, max_lat),
            })
        } else {
            None
        };

        Ok(Self {
            kind,
            id,
            base_timestamp,
            base,
            bounds,
        })
    }
}

/// Read an unsigned extent and add it to `base` in 64 bits.
fn offset_by(reader: &mut BlockReader<'_>, base: i32) -> DecodeResult<i32> {
    let offset = reader.offset();
    let extent = reader.read_uvarint()?;
    let overflow = || DecodeError::new(offset, DecodeErrorKind::Overflow { bits: 32 });
    let extent = i64::try_from(extent).map_err(|_| overflow())?;
    i64::from(base)
        .checked_add(extent)
        .and_then(|max| i32::try_from(max).ok())
        .ok_or_else(overflow)
}

/// The persisted form of one entity's full history.
///
/// Blocks are immutable. The header is parsed when the block is created so
/// kind, id and bounds are available without a full decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedBlock {
    bytes: Bytes,
    header: BlockHeader,
}

impl EncodedBlock {
    /// Wrap stored bytes, validating the header.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> DecodeResult<Self> {
        let bytes = bytes.into();
        let header = BlockHeader::read(&mut BlockReader::new(&bytes))?;
        Ok(Self { bytes, header })
    }

    pub(crate) const fn from_parts(bytes: Bytes, header: BlockHeader) -> Self {
        Self { bytes, header }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap, reference-counted handle to the bytes.
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub const fn header(&self) -> &BlockHeader {
        &self.header
    }

    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.header.kind
    }

    #[must_use]
    pub const fn id(&self) -> i64 {
        self.header.id
    }

    #[must_use]
    pub const fn entity(&self) -> EntityRef {
        EntityRef::new(self.header.kind, self.header.id)
    }

    /// Box covering every geometry the entity ever had, if known.
    #[must_use]
    pub const fn bounding_box(&self) -> Option<BoundingBox> {
        self.header.bounds
    }

    /// Decode the full history.
    pub fn decode(&self, codes: &CodeTable) -> BlockResult<VersionedEntity> {
        codec::decode(self, codes)
    }
}
