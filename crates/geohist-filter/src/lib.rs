//! Filters over reconstructed entity versions.
//!
//! A [`Filter`] is an immutable tree of `and`/`or` nodes over leaf
//! [`Predicate`]s. There is no `not` node: negating a filter pushes the
//! negation into the leaves, so every tree stays in negation normal form.
//!
//! ```
//! use geohist_codes::CodeTable;
//! use geohist_entity::EntityKind;
//! use geohist_filter::{Filter, FilterBuilder};
//!
//! let codes = CodeTable::new();
//! let b = FilterBuilder::new(&codes);
//! let filter = b.tag_equals("amenity", "cafe").unwrap()
//!     & (Filter::kind(EntityKind::Node) | b.tag_exists("building").unwrap());
//! assert_eq!(filter.to_string(), "amenity=cafe and (type:node or building=*)");
//! assert_eq!((!filter).to_string(), "amenity!=cafe or type!:node and building!=*");
//! ```

mod builder;
mod error;
mod eval;
mod filter;
mod predicate;

pub use builder::FilterBuilder;
pub use error::{FilterError, FilterResult};
pub use eval::GeometryFailure;
pub use filter::Filter;
pub use predicate::{GeometryTest, GeometryTypes, Label, Predicate, TagTest};
