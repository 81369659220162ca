//! Error types for the sync server.

use shelfsync_engine::SyncError;
use shelfsync_protocol::{ProtocolError, StoreId};
use shelfsync_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Request body could not be parsed or failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ProtocolError),

    /// The principal lacks the capability or the store is out of scope.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Store is not in the directory.
    #[error("store not found: {0}")]
    StoreNotFound(StoreId),

    /// Job id is unknown or has aged out of the history.
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// Engine failure.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// No async runtime to run the job on.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        ServerError::Sync(SyncError::Store(e))
    }
}

impl ServerError {
    /// HTTP status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::Forbidden(_) => 403,
            ServerError::StoreNotFound(_) | ServerError::JobNotFound(_) => 404,
            ServerError::Sync(e) => match e {
                SyncError::Validation(_) => 400,
                SyncError::StoreNotFound(_) | SyncError::Store(StoreError::ItemNotFound(_)) => 404,
                SyncError::NotConfigured { .. }
                | SyncError::SyncDisabled { .. }
                | SyncError::Store(
                    StoreError::InvalidTransition { .. }
                    | StoreError::LeaseConflict { .. }
                    | StoreError::LeaseLost(_),
                ) => 409,
                _ => 500,
            },
            ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
