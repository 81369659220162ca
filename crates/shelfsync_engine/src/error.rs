//! Error types for the reconciliation engine.

use shelfsync_protocol::{ProtocolError, StoreId};
use shelfsync_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failure reported by the external label system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    /// Timeouts, 5xx responses, transport failures. Retried with backoff.
    #[error("transient external failure: {0}")]
    Transient(String),

    /// Validation rejections. Never retried.
    #[error("permanent external failure: {0}")]
    Permanent(String),
}

impl ExternalError {
    /// Creates a transient failure.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    /// Creates a permanent failure.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    /// Returns true if retrying cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ExternalError::Permanent(_))
    }

    /// The failure reason.
    pub fn reason(&self) -> &str {
        match self {
            ExternalError::Transient(reason) | ExternalError::Permanent(reason) => reason,
        }
    }
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Request failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ProtocolError),

    /// The external label system failed.
    #[error(transparent)]
    External(#[from] ExternalError),

    /// An external call exceeded the request timeout.
    #[error("external call timed out after {0:?}")]
    Timeout(Duration),

    /// The store has no label system credentials.
    #[error("store {store_id} has no label system credentials")]
    NotConfigured {
        /// Store id.
        store_id: StoreId,
    },

    /// Sync is switched off for the store.
    #[error("sync is disabled for store {store_id}")]
    SyncDisabled {
        /// Store id.
        store_id: StoreId,
    },

    /// The store does not exist.
    #[error("store not found: {0}")]
    StoreNotFound(StoreId),

    /// Storage failure.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::External(e) => !e.is_permanent(),
            SyncError::Timeout(_) => true,
            SyncError::Store(e) => e.is_contention(),
            _ => false,
        }
    }

    /// Returns true if this is a lease collision with another worker.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_contention())
    }
}
