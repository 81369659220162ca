//! Outbound queue items.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{EntityType, QueueStatus, StoreId, SyncAction, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Opaque identity of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses the hyphenated form.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        Uuid::parse_str(text)
            .map(Self)
            .map_err(|e| ProtocolError::validation("id", e.to_string()))
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A persisted record of one outbound mutation to the external label system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Unique id.
    pub id: QueueItemId,
    /// Insertion sequence; breaks `scheduledAt` ties in FIFO order.
    pub seq: u64,
    /// Owning store.
    pub store_id: StoreId,
    /// Kind of entity mutated.
    pub entity_type: EntityType,
    /// Local entity identity.
    pub entity_id: String,
    /// Mutation to apply remotely.
    pub action: SyncAction,
    /// Current status.
    pub status: QueueStatus,
    /// Handler-specific mutation data.
    pub payload: Value,
    /// Number of failed transient attempts so far.
    pub retry_count: u32,
    /// Earliest time the item may be attempted.
    pub scheduled_at: Timestamp,
    /// Time the item was enqueued.
    pub created_at: Timestamp,
    /// Set once the item reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<Timestamp>,
    /// Lease deadline while `Processing`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<Timestamp>,
    /// Token of the current lease while `Processing`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_token: Option<u64>,
    /// Reason for the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncQueueItem {
    /// Materialises a new pending item from an enqueue request.
    pub fn from_new(new: NewQueueItem, seq: u64, now: Timestamp) -> Self {
        Self {
            id: QueueItemId::generate(),
            seq,
            store_id: new.store_id,
            entity_type: new.entity_type,
            entity_id: new.entity_id,
            action: new.action,
            status: QueueStatus::Pending,
            payload: new.payload,
            retry_count: 0,
            scheduled_at: now,
            created_at: now,
            processed_at: None,
            lease_expires_at: None,
            lease_token: None,
            last_error: None,
        }
    }

    /// Returns true if the item targets the given entity.
    pub fn same_entity(&self, store_id: &StoreId, entity_type: EntityType, entity_id: &str) -> bool {
        &self.store_id == store_id && self.entity_type == entity_type && self.entity_id == entity_id
    }

    /// Returns true if the item is pending and due at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == QueueStatus::Pending && self.scheduled_at <= now
    }

    /// FIFO ordering key with due-time gating.
    pub fn order_key(&self) -> (Timestamp, u64) {
        (self.scheduled_at, self.seq)
    }
}

/// A request to enqueue a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQueueItem {
    /// Owning store.
    pub store_id: StoreId,
    /// Kind of entity mutated.
    pub entity_type: EntityType,
    /// Local entity identity.
    pub entity_id: String,
    /// Mutation to apply remotely.
    pub action: SyncAction,
    /// Handler-specific mutation data.
    pub payload: Value,
}

impl NewQueueItem {
    /// Creates an enqueue request.
    pub fn new(
        store_id: impl Into<StoreId>,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        action: SyncAction,
        payload: Value,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            entity_type,
            entity_id: entity_id.into(),
            action,
            payload,
        }
    }

    /// Checks identifiers before the request touches the queue.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.store_id.is_blank() {
            return Err(ProtocolError::validation("storeId", "must not be empty"));
        }
        if self.entity_id.trim().is_empty() {
            return Err(ProtocolError::validation("entityId", "must not be empty"));
        }
        Ok(())
    }
}

/// Aggregate queue counts for a store (or all stores).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    /// Items waiting to be attempted.
    pub pending: u64,
    /// Items currently leased.
    pub processing: u64,
    /// Items accepted by the external system.
    pub completed: u64,
    /// Items needing operator attention.
    pub failed: u64,
}

impl QueueCounts {
    /// Counts one item.
    pub fn record(&mut self, status: QueueStatus) {
        match status {
            QueueStatus::Pending => self.pending += 1,
            QueueStatus::Processing => self.processing += 1,
            QueueStatus::Completed => self.completed += 1,
            QueueStatus::Failed => self.failed += 1,
        }
    }

    /// Adds another set of counts.
    pub fn merge(&mut self, other: &QueueCounts) {
        self.pending += other.pending;
        self.processing += other.processing;
        self.completed += other.completed;
        self.failed += other.failed;
    }

    /// Total number of items.
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }

    /// Items not yet terminal.
    pub fn outstanding(&self) -> u64 {
        self.pending + self.processing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_item(action: SyncAction) -> NewQueueItem {
        NewQueueItem::new("store-1", EntityType::Spaces, "space-7", action, json!({"name": "A1"}))
    }

    #[test]
    fn from_new_starts_pending_and_due() {
        let item = SyncQueueItem::from_new(new_item(SyncAction::Create), 3, 1_000);
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.scheduled_at, 1_000);
        assert_eq!(item.seq, 3);
        assert!(item.is_due(1_000));
        assert!(!item.is_due(999));
        assert!(item.processed_at.is_none());
    }

    #[test]
    fn validate_rejects_blank_ids() {
        let mut req = new_item(SyncAction::Update);
        assert!(req.validate().is_ok());

        req.entity_id = " ".into();
        assert!(matches!(
            req.validate(),
            Err(ProtocolError::Validation { field: "entityId", .. })
        ));

        let req = NewQueueItem::new("", EntityType::People, "p1", SyncAction::Create, json!({}));
        assert!(req.validate().is_err());
    }

    #[test]
    fn item_serializes_camel_case() {
        let item = SyncQueueItem::from_new(new_item(SyncAction::Link), 1, 42);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["storeId"], "store-1");
        assert_eq!(value["entityType"], "spaces");
        assert_eq!(value["retryCount"], 0);
        assert_eq!(value["scheduledAt"], 42);
        assert!(value.get("processedAt").is_none());
    }

    #[test]
    fn counts_aggregate() {
        let mut counts = QueueCounts::default();
        counts.record(QueueStatus::Pending);
        counts.record(QueueStatus::Pending);
        counts.record(QueueStatus::Failed);

        let mut other = QueueCounts::default();
        other.record(QueueStatus::Completed);
        counts.merge(&other);

        assert_eq!(counts.pending, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.outstanding(), 2);
    }

    #[test]
    fn id_parse_rejects_garbage() {
        let id = QueueItemId::generate();
        assert_eq!(QueueItemId::parse(&id.to_string()).unwrap(), id);
        assert!(QueueItemId::parse("not-a-uuid").is_err());
    }
}
