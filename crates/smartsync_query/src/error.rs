//! Error types for query rewriting.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while turning a parsed query back into a builder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The `limit` clause is not an integer.
    #[error("invalid limit clause: {text:?}")]
    InvalidLimit {
        /// Clause text as found in the query.
        text: String,
    },

    /// The `offset` clause is not an integer.
    #[error("invalid offset clause: {text:?}")]
    InvalidOffset {
        /// Clause text as found in the query.
        text: String,
    },
}
