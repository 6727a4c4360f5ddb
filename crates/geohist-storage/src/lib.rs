//! Historical entity storage and point-in-time queries.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  HistoryWriter                                                   │
//! │    - bounds across history (ways from member nodes)              │
//! │    - one EncodedBlock per entity                                 │
//! │    - per kind: id → enclosing XyGrid cell                        │
//! │    - per kind: ids in (cell, id) order plus a CellDirectory      │
//! └──────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  HistoryStore::query                                             │
//! │    directory runs in area → ids → bounds → decode → filter       │
//! │    lazy QueryStream, or par_collect across the rayon pool        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use geohist_codes::CodeTable;
//! use geohist_entity::{BoundingBox, Coordinate, EntityKind, Timestamp, Version, VersionedEntity};
//! use geohist_filter::Filter;
//! use geohist_storage::{GeohistConfig, HistoryWriter, Query};
//!
//! let codes = Arc::new(CodeTable::new());
//! let config = GeohistConfig::default();
//!
//! let mut writer = HistoryWriter::new(Arc::clone(&codes), config.clone()).unwrap();
//! writer
//!     .add(
//!         VersionedEntity::new(
//!             EntityKind::Node,
//!             1,
//!             vec![
//!                 Version::node(1, Timestamp::from_secs(100), Coordinate::new(0, 0)),
//!                 Version::deleted(2, Timestamp::from_secs(200)),
//!             ],
//!         )
//!         .unwrap(),
//!     )
//!     .unwrap();
//! let store = writer.finish().unwrap().open(codes, &config).unwrap();
//!
//! let area = BoundingBox::from_degrees(-1.0, -1.0, 1.0, 1.0).unwrap();
//! let query = Query::new(
//!     area,
//!     [Timestamp::from_secs(150), Timestamp::from_secs(250)],
//!     Filter::kind(EntityKind::Node),
//! );
//! let matches: Vec<bool> = store.query(query).map(|row| row.unwrap().matches).collect();
//! assert_eq!(matches, [true, false]);
//! ```

mod config;
mod contribution;
mod error;
mod geometry;
mod query;
mod reconstruct;
mod source;
mod store;
mod timestamps;

pub use config::{GeohistConfig, QueryConfig};
pub use contribution::{Contribution, ContributionKind, contributions};
pub use error::{QueryError, QueryResult, StorageError, StorageResult};
pub use geometry::GeometryResolver;
pub use query::{Completeness, Query, QueryOutput, QueryRow, QueryStream};
pub use reconstruct::{reconstruct, version_at};
pub use source::{BlockSource, MemoryBlockSource};
pub use store::{Dataset, HistoryStore, HistoryWriter, Manifest};
pub use timestamps::TimestampSeries;
