//! Versioned map entities for geohist.
//!
//! An entity (node, way or relation) is stored as its complete edit
//! history: every version ever published, oldest first. This crate holds the
//! in-memory model and the compact block format histories are persisted in.
//!
//! # Block format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ header   u8  kind (bits 0-1) | HAS_BOUNDS (bit 2)                │
//! │ id       zigzag varint                                           │
//! │ base ts  uvarint            first version's timestamp            │
//! │ base lon zigzag varint      minimum longitude                    │
//! │ base lat zigzag varint      minimum latitude                     │
//! │ bounds   2 × uvarint        lon/lat extent (if HAS_BOUNDS)       │
//! │ keys     uvarint n, n × uvarint key code                         │
//! │ count    uvarint number of version records                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ record × count: ts delta, flags, version delta, [changeset],     │
//! │                 [user], [tags], [payload]                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every numeric field after the header is a delta against the previous
//! value of the same field, so long histories of small edits stay small.
//!
//! # Usage
//!
//! ```
//! use geohist_codes::{CodeSpace, CodeTable};
//! use geohist_entity::{Coordinate, EntityKind, Tag, Timestamp, Version, VersionedEntity};
//!
//! let codes = CodeTable::new();
//! let key = codes.resolve_one(CodeSpace::Key, "amenity").unwrap();
//! let value = codes.resolve_one(CodeSpace::Value, "cafe").unwrap();
//!
//! let node = VersionedEntity::new(
//!     EntityKind::Node,
//!     42,
//!     vec![
//!         Version::node(1, Timestamp::from_secs(1_000), Coordinate::new(85_000_000, 475_000_000)),
//!         Version::node(2, Timestamp::from_secs(2_000), Coordinate::new(85_000_100, 475_000_000))
//!             .with_tags([Tag::new(key, value)]),
//!     ],
//! )
//! .unwrap();
//!
//! let block = node.encode(&codes).unwrap();
//! assert_eq!(block.decode(&codes).unwrap(), node);
//! ```

mod block;
mod codec;
mod entity;
mod error;
mod geometry;

pub use block::{BlockHeader, EncodedBlock};
pub use codec::{decode, encode, encode_with_bounds};
pub use entity::{
    EntityKind, EntityRef, Member, Payload, Tag, Timestamp, Version, VersionedEntity,
};
pub use error::{BlockError, BlockResult, EncodeError, HistoryError};
pub use geometry::{BoundingBox, Coordinate, Geometry, GeometryError, GeometryKind};
pub use geohist_protocol::{DecodeError, DecodeErrorKind};
