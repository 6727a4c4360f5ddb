//! Index error types.

use geohist_protocol::DecodeError;
use thiserror::Error;

use crate::PageKey;

/// Failures reported by a [`crate::PageSource`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageSourceError {
    #[error("page {0} not found")]
    NotFound(PageKey),

    #[error("page backend failure: {0}")]
    Backend(String),
}

/// Errors building or reading a paged index.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Keys must be pushed in strictly ascending order.
    #[error("key {key} does not follow {previous}")]
    UnsortedKey { previous: u64, key: u64 },

    /// `-1` marks an empty slot and cannot be stored.
    #[error("key {key} maps to the reserved absent value")]
    ReservedValue { key: u64 },

    #[error("slot {offset} is outside a page of {page_size}")]
    SlotOutOfRange { offset: u32, page_size: u32 },

    #[error("invalid index configuration: {0}")]
    Config(&'static str),

    #[error("page {page} has {len} bytes, which fits neither layout")]
    PageLength { page: u64, len: usize },

    #[error("page {page} is corrupt: {source}")]
    PageDecode { page: u64, source: DecodeError },

    #[error("invalid cell directory: {0}")]
    Directory(&'static str),

    #[error(transparent)]
    Source(#[from] PageSourceError),
}

pub type IndexResult<T> = Result<T, IndexError>;
