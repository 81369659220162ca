//! # ShelfSync Protocol
//!
//! Queue, article and status types shared by every ShelfSync crate.
//!
//! This crate provides:
//! - `SyncQueueItem` and its status lifecycle
//! - Supersession rules for collapsing queued mutations
//! - Store configuration and field mapping for remote articles
//! - Request/response messages for the trigger, status and queue endpoints
//!
//! This is a pure crate with no I/O operations. All messages serialize to
//! camelCase JSON.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod article;
mod error;
mod messages;
mod queue;
mod supersede;
mod types;

pub use article::{AimsCredentials, FieldMapping, RemoteArticle, StoreConfig};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    PullSyncResponse, PushSyncResponse, QueueListResponse, QueueQuery, StoreSyncStatusResponse,
    SyncHealth, SyncStatusResponse, TriggerSyncRequest, TriggerSyncResponse,
};
pub use queue::{NewQueueItem, QueueCounts, QueueItemId, SyncQueueItem};
pub use supersede::{supersede, Supersession};
pub use types::{EntityType, QueueStatus, StoreId, SyncAction, SyncType, Timestamp};
