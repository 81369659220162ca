//! Request and response messages for the sync endpoints.

use crate::error::{ProtocolError, ProtocolResult};
use crate::queue::{QueueCounts, SyncQueueItem};
use crate::types::{EntityType, QueueStatus, StoreId, SyncType, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /sync/trigger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncRequest {
    /// Store to sync.
    pub store_id: StoreId,
    /// Cycle kind.
    #[serde(rename = "type")]
    pub sync_type: SyncType,
    /// Restricts the cycle to these entity types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<EntityType>>,
}

impl TriggerSyncRequest {
    /// Creates a trigger for every entity type.
    pub fn new(store_id: impl Into<StoreId>, sync_type: SyncType) -> Self {
        Self {
            store_id: store_id.into(),
            sync_type,
            entities: None,
        }
    }

    /// Restricts the trigger to `entities`.
    pub fn with_entities(mut self, entities: Vec<EntityType>) -> Self {
        self.entities = Some(entities);
        self
    }

    /// Parses and validates a JSON body.
    pub fn from_json(body: &[u8]) -> ProtocolResult<Self> {
        let request: Self = serde_json::from_slice(body)?;
        request.validate()?;
        Ok(request)
    }

    /// Validates field contents.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.store_id.is_blank() {
            return Err(ProtocolError::validation("storeId", "must not be empty"));
        }
        if let Some(entities) = &self.entities {
            if entities.is_empty() {
                return Err(ProtocolError::validation(
                    "entities",
                    "must list at least one entity type when present",
                ));
            }
            for (i, entity) in entities.iter().enumerate() {
                if entities[..i].contains(entity) {
                    return Err(ProtocolError::validation(
                        "entities",
                        format!("duplicate entity type {}", entity),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Entity types covered by the cycle.
    pub fn entity_filter(&self) -> Vec<EntityType> {
        self.entities
            .clone()
            .unwrap_or_else(|| EntityType::ALL.to_vec())
    }
}

/// Response of `POST /sync/trigger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncResponse {
    /// Human-readable acknowledgement.
    pub message: String,
    /// Background job id.
    pub job_id: Uuid,
    /// Queue counts for the store at trigger time.
    pub stats: QueueCounts,
}

/// Result of a pull cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullSyncResponse {
    /// Remote records examined.
    pub total: u64,
    /// Records with no local match, inserted.
    pub created: u64,
    /// Records whose local entity changed.
    pub updated: u64,
    /// Records already in sync.
    pub unchanged: u64,
    /// Records lacking the unique id field.
    #[serde(default)]
    pub skipped: u64,
}

impl PullSyncResponse {
    /// Adds another pull result.
    pub fn merge(&mut self, other: &PullSyncResponse) {
        self.total += other.total;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
    }
}

/// Result of a push cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSyncResponse {
    /// Items attempted.
    pub total: u64,
    /// Items accepted by the external system.
    pub succeeded: u64,
    /// Items marked failed (permanent rejection or out of retries).
    pub failed: u64,
    /// Items rescheduled with backoff.
    pub retried: u64,
    /// Items skipped because another worker holds the lease.
    pub skipped: u64,
}

impl PushSyncResponse {
    /// Adds another push result.
    pub fn merge(&mut self, other: &PushSyncResponse) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.retried += other.retried;
        self.skipped += other.skipped;
    }
}

/// Coarse sync health derived from queue counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncHealth {
    /// Nothing outstanding, nothing failed.
    Idle,
    /// Work outstanding, nothing failed.
    Pending,
    /// At least one failed item needs an operator.
    Degraded,
}

impl SyncHealth {
    /// Derives health from queue counts.
    pub fn from_counts(counts: &QueueCounts) -> Self {
        if counts.failed > 0 {
            SyncHealth::Degraded
        } else if counts.outstanding() > 0 {
            SyncHealth::Pending
        } else {
            SyncHealth::Idle
        }
    }
}

/// Sync status of one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSyncStatusResponse {
    /// Store identity.
    pub store_id: StoreId,
    /// Whether sync is enabled for the store.
    pub sync_enabled: bool,
    /// Credentials present and external system reachable.
    pub aims_connected: bool,
    /// Most recent successful sync activity.
    pub last_sync_at: Option<Timestamp>,
    /// Derived health.
    pub health: SyncHealth,
    /// Queue counts for the store.
    pub queue: QueueCounts,
}

/// Sync status across all stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    /// Per-store status.
    pub stores: Vec<StoreSyncStatusResponse>,
    /// Queue counts summed over `stores`.
    pub queue: QueueCounts,
    /// Health derived from the summed counts.
    pub health: SyncHealth,
}

impl SyncStatusResponse {
    /// Builds the overall status from per-store entries.
    pub fn from_stores(stores: Vec<StoreSyncStatusResponse>) -> Self {
        let mut queue = QueueCounts::default();
        for store in &stores {
            queue.merge(&store.queue);
        }
        Self {
            health: SyncHealth::from_counts(&queue),
            stores,
            queue,
        }
    }
}

/// Query of `GET /sync/queue`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueQuery {
    /// Restrict to one store.
    #[serde(default)]
    pub store_id: Option<StoreId>,
    /// Restrict to one status.
    #[serde(default)]
    pub status: Option<QueueStatus>,
    /// Items to skip.
    #[serde(default)]
    pub offset: usize,
    /// Page size; the server applies its default and maximum.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueueQuery {
    /// Query for one store.
    pub fn for_store(store_id: impl Into<StoreId>) -> Self {
        Self {
            store_id: Some(store_id.into()),
            ..Self::default()
        }
    }

    /// Restricts to `status`.
    pub fn with_status(mut self, status: QueueStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the page window.
    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Returns true if `item` matches the store and status filters.
    pub fn matches(&self, item: &SyncQueueItem) -> bool {
        self.store_id.as_ref().map_or(true, |s| &item.store_id == s)
            && self.status.map_or(true, |s| item.status == s)
    }
}

/// Response of `GET /sync/queue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueListResponse {
    /// Items in FIFO order.
    pub items: Vec<SyncQueueItem>,
    /// Matching items before paging.
    pub total: usize,
    /// Applied offset.
    pub offset: usize,
    /// Applied page size.
    pub limit: usize,
}
