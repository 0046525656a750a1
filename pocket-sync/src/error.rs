//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned to local callers of the engine and bridge.
///
/// Remote operations never surface as errors: malformed ones are dropped
/// and reported through the event stream instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The field has no CRDT type in the engine configuration.
    #[error("field {field:?} has no configured CRDT type")]
    UnconfiguredField { field: String },

    /// The operation kind or value does not fit the field's CRDT type.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}
