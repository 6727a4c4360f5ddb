//! Entity and block error types.

use geohist_codes::CodeError;
use geohist_protocol::DecodeError;
use thiserror::Error;

use crate::EntityKind;

/// A version list that violates the history invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history has no versions")]
    Empty,

    #[error("version {index} is not newer than its predecessor")]
    TimestampOrder { index: usize },

    #[error("version {index} does not increase the version number")]
    VersionOrder { index: usize },

    #[error("deleted version {index} carries tags or payload")]
    DeletionWithContent { index: usize },

    #[error("version {index} payload does not fit a {kind}")]
    PayloadMismatch { index: usize, kind: EntityKind },

    #[error("way version {index} references a non-node member or a role")]
    InvalidWayMember { index: usize },
}

/// Failures while encoding a history into a block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Every code a block references must exist before the block is written.
    #[error(transparent)]
    Code(#[from] CodeError),

    #[error("node coordinate lies outside the block bounds")]
    OutsideBounds,

    #[error("bounding box minimum exceeds its maximum")]
    InvertedBounds,
}

/// Failures while reading a block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// Truncated or malformed bytes.
    #[error("decode failure: {0}")]
    Decode(#[from] DecodeError),

    /// The block references a code the table cannot resolve.
    #[error("code resolution failure: {0}")]
    Code(#[from] CodeError),
}

pub type BlockResult<T> = Result<T, BlockError>;
