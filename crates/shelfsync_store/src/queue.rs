//! The sync queue store contract.

use crate::error::StoreResult;
use shelfsync_protocol::{
    EntityType, NewQueueItem, QueueCounts, QueueItemId, QueueQuery, StoreId, SyncQueueItem,
    Timestamp,
};

/// What happened to an enqueue request.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new pending item was appended.
    Inserted(SyncQueueItem),
    /// An existing pending item was rewritten in place.
    Replaced(SyncQueueItem),
    /// The request cancelled an existing pending item; nothing is queued.
    Cancelled {
        /// Id of the removed item.
        removed: QueueItemId,
    },
    /// The request repeated an existing pending item; nothing changed.
    Duplicate(QueueItemId),
}

impl EnqueueOutcome {
    /// The item that now carries the mutation, if any.
    pub fn item(&self) -> Option<&SyncQueueItem> {
        match self {
            EnqueueOutcome::Inserted(item) | EnqueueOutcome::Replaced(item) => Some(item),
            EnqueueOutcome::Cancelled { .. } | EnqueueOutcome::Duplicate(_) => None,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EnqueueOutcome::Inserted(_) => "inserted",
            EnqueueOutcome::Replaced(_) => "replaced",
            EnqueueOutcome::Cancelled { .. } => "cancelled",
            EnqueueOutcome::Duplicate(_) => "duplicate",
        }
    }
}

/// Exclusive ownership of one queue item while it is `Processing`.
///
/// Every transition out of `Processing` must present the lease; a lease that
/// was reclaimed after expiry is rejected with `LeaseLost`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    item: SyncQueueItem,
    token: u64,
}

impl Lease {
    pub(crate) fn new(item: SyncQueueItem, token: u64) -> Self {
        Self { item, token }
    }

    /// Snapshot of the item at lease time.
    pub fn item(&self) -> &SyncQueueItem {
        &self.item
    }

    /// Leased item id.
    pub fn id(&self) -> QueueItemId {
        self.item.id
    }

    /// Lease token.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Lease deadline.
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.item.lease_expires_at
    }
}

/// Persisted queue of outbound mutations.
///
/// Every method is atomic with respect to every other method on the same
/// store. `try_lease` is the compare-and-set that makes the single-owner lease
/// safe under concurrent workers.
pub trait QueueStore: Send + Sync {
    /// Appends a mutation, collapsing it with the newest pending item for the
    /// same entity when one supersedes the other.
    fn enqueue(&self, item: NewQueueItem, now: Timestamp) -> StoreResult<EnqueueOutcome>;

    /// Fetches one item.
    fn get(&self, id: QueueItemId) -> StoreResult<Option<SyncQueueItem>>;

    /// Lists items matching the store/status filters in insertion order.
    /// Paging fields of `query` are ignored.
    fn list(&self, query: &QueueQuery) -> StoreResult<Vec<SyncQueueItem>>;

    /// Pending items of `store_id` due at `now`, ordered by `scheduledAt`
    /// then insertion order.
    fn due(
        &self,
        store_id: &StoreId,
        entity_types: &[EntityType],
        now: Timestamp,
        limit: usize,
    ) -> StoreResult<Vec<SyncQueueItem>>;

    /// Moves a due item from `Pending` to `Processing` if and only if it is
    /// still pending. Losing the race yields `LeaseConflict`.
    fn try_lease(&self, id: QueueItemId, now: Timestamp, lease_until: Timestamp)
        -> StoreResult<Lease>;

    /// Marks a leased item completed.
    fn complete(&self, lease: &Lease, now: Timestamp) -> StoreResult<SyncQueueItem>;

    /// Returns a leased item to `Pending` with a new retry count and due time.
    fn reschedule(
        &self,
        lease: &Lease,
        retry_count: u32,
        scheduled_at: Timestamp,
        reason: &str,
    ) -> StoreResult<SyncQueueItem>;

    /// Marks a leased item permanently failed.
    fn fail(
        &self,
        lease: &Lease,
        retry_count: u32,
        now: Timestamp,
        reason: &str,
    ) -> StoreResult<SyncQueueItem>;

    /// Returns items whose lease expired before `now` to `Pending` as a failed
    /// attempt, or to `Failed` once `max_retries` is exceeded.
    fn reclaim_expired(&self, now: Timestamp, max_retries: u32) -> StoreResult<Vec<SyncQueueItem>>;

    /// Re-enqueues a failed item as a fresh pending mutation and drops the
    /// failed row.
    fn requeue_failed(&self, id: QueueItemId, now: Timestamp) -> StoreResult<EnqueueOutcome>;

    /// Removes a non-leased item.
    fn remove(&self, id: QueueItemId) -> StoreResult<Option<SyncQueueItem>>;

    /// Removes every failed item of `store_id`.
    fn clear_failed(&self, store_id: &StoreId) -> StoreResult<usize>;

    /// Removes completed items processed before `before`.
    fn purge_completed(&self, before: Timestamp) -> StoreResult<usize>;

    /// Counts items per status, for one store or all.
    fn counts(&self, store_id: Option<&StoreId>) -> StoreResult<QueueCounts>;

    /// Latest `processedAt` over completed items of `store_id`.
    fn last_completed_at(&self, store_id: &StoreId) -> StoreResult<Option<Timestamp>>;

    /// Distinct store ids with at least one item.
    fn store_ids(&self) -> StoreResult<Vec<StoreId>>;
}
