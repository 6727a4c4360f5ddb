//! Storage and query error types.

use geohist_entity::{BlockError, EncodeError, EntityRef, HistoryError};
use geohist_filter::FilterError;
use geohist_index::IndexError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The block source has nothing stored for the entity.
    #[error("entity not found: {0}")]
    NotFound(EntityRef),

    /// The block source failed for another reason.
    #[error("block source error: {0}")]
    Backend(String),

    #[error("block for {entity} could not be read: {source}")]
    Block {
        entity: EntityRef,
        #[source]
        source: BlockError,
    },

    #[error("entity {entity} could not be encoded: {source}")]
    Encode {
        entity: EntityRef,
        #[source]
        source: EncodeError,
    },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Index(#[from] IndexError),

    /// Index keys are unsigned.
    #[error("{0} has a negative id and cannot be indexed")]
    NegativeId(EntityRef),

    #[error("{0} was added twice")]
    Duplicate(EntityRef),

    #[error("invalid timestamp series: {0}")]
    InvalidSeries(&'static str),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A per-item failure in a query stream. The stream continues after it.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The entity's block is corrupt.
    #[error("decode failure for {entity}: {source}")]
    Decode {
        entity: EntityRef,
        #[source]
        source: geohist_entity::DecodeError,
    },

    /// The index names an entity storage cannot produce, or holds a value
    /// that is not a grid cell.
    #[error("index inconsistency for {entity}: {reason}")]
    Inconsistent { entity: EntityRef, reason: String },

    /// Reading index pages failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// A geometry predicate failed under strict evaluation.
    #[error("filter evaluation failed for {entity}: {source}")]
    Filter {
        entity: EntityRef,
        #[source]
        source: FilterError,
    },
}

pub type QueryResult<T> = Result<T, QueryError>;
