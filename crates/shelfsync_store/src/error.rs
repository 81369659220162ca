//! Error types for the storage layer.

use shelfsync_protocol::{QueueItemId, QueueStatus, StoreId};
use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in queue, entity or directory storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The queue directory is held by another process.
    #[error("queue locked: another process has exclusive access")]
    Locked,

    /// Queue item does not exist.
    #[error("queue item not found: {0}")]
    ItemNotFound(QueueItemId),

    /// Store does not exist in the directory.
    #[error("store not found: {0}")]
    StoreNotFound(StoreId),

    /// Local entity does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(Uuid),

    /// A local entity with the same external id already exists.
    #[error("entity {external_id} already exists in store {store_id}")]
    EntityExists {
        /// Owning store.
        store_id: StoreId,
        /// External id that collided.
        external_id: String,
    },

    /// Compare-and-set on the item's status lost to another writer.
    #[error("lease conflict on {id}: item is {actual}")]
    LeaseConflict {
        /// Item id.
        id: QueueItemId,
        /// Status observed at the time of the attempt.
        actual: QueueStatus,
    },

    /// The caller's lease was reclaimed or replaced.
    #[error("lease lost on {0}")]
    LeaseLost(QueueItemId),

    /// Requested status change is not a forward transition.
    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// Item id.
        id: QueueItemId,
        /// Current status.
        from: QueueStatus,
        /// Attempted status.
        to: QueueStatus,
    },

    /// The enqueue request failed validation.
    #[error("invalid queue item: {0}")]
    Invalid(#[from] shelfsync_protocol::ProtocolError),

    /// Snapshot has an unsupported layout.
    #[error("invalid queue format: {message}")]
    InvalidFormat {
        /// Description of the problem.
        message: String,
    },
}

impl StoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true if the error reflects a concurrent writer rather than a fault.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            StoreError::LeaseConflict { .. } | StoreError::LeaseLost(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_classification() {
        let id = QueueItemId::generate();
        assert!(StoreError::LeaseConflict {
            id,
            actual: QueueStatus::Processing
        }
        .is_contention());
        assert!(StoreError::LeaseLost(id).is_contention());
        assert!(!StoreError::ItemNotFound(id).is_contention());
        assert!(!StoreError::Locked.is_contention());
    }

    #[test]
    fn transition_display() {
        let err = StoreError::InvalidTransition {
            id: QueueItemId::generate(),
            from: QueueStatus::Failed,
            to: QueueStatus::Pending,
        };
        assert!(err.to_string().contains("failed -> pending"));
    }
}
