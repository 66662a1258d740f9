//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Invalid job or target configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A job with this name already exists.
    #[error("a sync job named {name:?} already exists")]
    DuplicateJobName {
        /// The conflicting name.
        name: String,
    },

    /// A custom target names an implementation that was never registered.
    #[error("no target implementation registered as {implementation:?}")]
    UnknownTarget {
        /// The implementation identifier.
        implementation: String,
    },

    /// No job with this id or name exists.
    #[error("sync job not found: {0}")]
    JobNotFound(String),

    /// The remote service answered with an unexpected payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Query could not be rewritten.
    #[error("query error: {0}")]
    Query(#[from] smartsync_query::QueryError),

    /// Sync was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The job is already being run by this runner.
    #[error("sync job {0} is already running")]
    JobRunning(i64),

    /// The orchestrator worker is no longer running.
    #[error("sync orchestrator is shut down")]
    Shutdown,

    /// A blocking sync task panicked or was aborted.
    #[error("sync worker failed: {0}")]
    Worker(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { retryable: true, .. })
    }

    /// Returns true if this error comes from invalid configuration and will
    /// fail again on every attempt.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_)
                | SyncError::DuplicateJobName { .. }
                | SyncError::UnknownTarget { .. }
                | SyncError::Json(_)
        )
    }
}

/// Errors raised by a local store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// The record is not a JSON object.
    #[error("record in {collection} is not a JSON object")]
    NotAnObject {
        /// Target collection.
        collection: String,
    },

    /// Backend failure.
    #[error("{0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::configuration("bad").is_retryable());
    }

    #[test]
    fn configuration_errors() {
        assert!(SyncError::DuplicateJobName { name: "a".into() }.is_configuration());
        assert!(SyncError::UnknownTarget {
            implementation: "x".into()
        }
        .is_configuration());
        assert!(!SyncError::transport_retryable("x").is_configuration());
    }

    #[test]
    fn error_display() {
        assert_eq!(SyncError::Cancelled.to_string(), "cancelled");

        let err = SyncError::DuplicateJobName {
            name: "accounts".into(),
        };
        assert_eq!(err.to_string(), "a sync job named \"accounts\" already exists");

        let err: SyncError = StoreError::CollectionNotFound("contacts".into()).into();
        assert_eq!(err.to_string(), "store error: collection not found: contacts");
    }
}
