//! Code table error types.

use thiserror::Error;

use crate::{Code, CodeSpace};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// A block references a code with no backing string, usually an
    /// ingestion/query codec version mismatch.
    #[error("unknown {space} code {code}")]
    UnknownCode { space: CodeSpace, code: Code },

    /// The backing store failed.
    #[error("code store error: {0}")]
    Store(String),

    /// The backing store answered a batch with the wrong number of results.
    #[error("code store returned {got} results for a batch of {expected}")]
    BatchMismatch { expected: usize, got: usize },

    /// All 2^32 codes of a space are in use.
    #[error("{0} code space exhausted")]
    Exhausted(CodeSpace),
}

pub type CodeResult<T> = Result<T, CodeError>;
