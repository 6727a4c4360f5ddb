//! Paged index from large, sparse integer key spaces to `i64` values.
//!
//! The key domain is cut into fixed-size pages. Each page is stored on its
//! own, either dense (a flat little-endian `i64` array with `-1` for absent
//! slots) or sparse (an occupancy bitmap followed by zigzag deltas of the
//! present values). Only the pages a lookup touches are ever loaded.
//!
//! ```
//! use geohist_index::{IndexBuilder, IndexConfig, MemoryPageSource, PagedLongIndex, ABSENT};
//!
//! let mut builder = IndexBuilder::new(0, IndexConfig::default());
//! builder.push(3, 10).unwrap();
//! builder.push(7, 15).unwrap();
//! let built = builder.build().unwrap();
//!
//! let source = MemoryPageSource::new();
//! source.store(&built);
//! let index = PagedLongIndex::open(built.meta, source, 16).unwrap();
//! assert_eq!(index.get(7).unwrap(), 15);
//! assert_eq!(index.get(0).unwrap(), ABSENT);
//! ```

mod bitmap;
mod builder;
mod config;
mod directory;
mod error;
mod grid;
mod index;
mod key;
mod page;
mod source;

pub use bitmap::Bitmap;
pub use builder::{BuiltIndex, IndexBuilder, IndexMeta};
pub use config::{GridConfig, IndexConfig, PageEncodingPolicy};
pub use directory::{CellDirectory, CellRun};
pub use error::{IndexError, IndexResult, PageSourceError};
pub use grid::{CellId, XyGrid};
pub use index::PagedLongIndex;
pub use key::PageKey;
pub use page::{DensePage, IndexPage, PageEncoding, SparsePage};
pub use source::{MemoryPageSource, PageSource};

/// Value returned for keys without an entry.
pub const ABSENT: i64 = -1;
