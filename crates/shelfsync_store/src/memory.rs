//! In-memory queue store.
//!
//! `QueueState` holds the queue rows and implements every transition; the
//! in-memory store guards it with a lock and the file store persists it after
//! each mutation.

use crate::error::{StoreError, StoreResult};
use crate::queue::{EnqueueOutcome, Lease, QueueStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shelfsync_protocol::{
    supersede, EntityType, NewQueueItem, QueueCounts, QueueItemId, QueueQuery, QueueStatus,
    StoreId, Supersession, SyncQueueItem, Timestamp,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const LEASE_EXPIRED: &str = "lease expired";

/// Queue rows keyed by insertion sequence.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueueState {
    next_seq: u64,
    next_lease: u64,
    items: BTreeMap<u64, SyncQueueItem>,
    index: HashMap<QueueItemId, u64>,
}

/// On-disk form of `QueueState`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueueSnapshot {
    pub(crate) version: u32,
    pub(crate) next_seq: u64,
    pub(crate) next_lease: u64,
    pub(crate) items: Vec<SyncQueueItem>,
}

impl QueueState {
    pub(crate) const SNAPSHOT_VERSION: u32 = 1;

    pub(crate) fn from_snapshot(snapshot: QueueSnapshot) -> StoreResult<Self> {
        if snapshot.version != Self::SNAPSHOT_VERSION {
            return Err(StoreError::invalid_format(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let mut state = Self {
            next_seq: snapshot.next_seq,
            next_lease: snapshot.next_lease,
            ..Self::default()
        };
        for item in snapshot.items {
            if state.index.insert(item.id, item.seq).is_some() {
                return Err(StoreError::invalid_format(format!("duplicate item id {}", item.id)));
            }
            state.next_seq = state.next_seq.max(item.seq + 1);
            if state.items.insert(item.seq, item).is_some() {
                return Err(StoreError::invalid_format("duplicate item sequence"));
            }
        }
        Ok(state)
    }

    pub(crate) fn to_snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            version: Self::SNAPSHOT_VERSION,
            next_seq: self.next_seq,
            next_lease: self.next_lease,
            items: self.items.values().cloned().collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    fn insert(&mut self, new: NewQueueItem, now: Timestamp) -> SyncQueueItem {
        let seq = self.next_seq;
        self.next_seq += 1;
        let item = SyncQueueItem::from_new(new, seq, now);
        self.index.insert(item.id, seq);
        self.items.insert(seq, item.clone());
        item
    }

    fn item(&self, id: QueueItemId) -> Option<&SyncQueueItem> {
        self.index.get(&id).and_then(|seq| self.items.get(seq))
    }

    fn item_mut(&mut self, id: QueueItemId) -> Option<&mut SyncQueueItem> {
        let seq = *self.index.get(&id)?;
        self.items.get_mut(&seq)
    }

    fn take(&mut self, id: QueueItemId) -> Option<SyncQueueItem> {
        let seq = self.index.remove(&id)?;
        self.items.remove(&seq)
    }

    fn leased_mut(&mut self, lease: &Lease) -> StoreResult<&mut SyncQueueItem> {
        let id = lease.id();
        let item = self.item_mut(id).ok_or(StoreError::ItemNotFound(id))?;
        if item.status != QueueStatus::Processing || item.lease_token != Some(lease.token()) {
            return Err(StoreError::LeaseLost(id));
        }
        Ok(item)
    }

    pub(crate) fn enqueue(&mut self, new: NewQueueItem, now: Timestamp) -> StoreResult<EnqueueOutcome> {
        new.validate()?;

        let newest = self
            .items
            .values()
            .rev()
            .find(|item| {
                !item.status.is_terminal()
                    && item.same_entity(&new.store_id, new.entity_type, &new.entity_id)
            })
            .map(|item| (item.id, supersede(item, &new)));

        let outcome = match newest {
            None | Some((_, Supersession::Append)) => EnqueueOutcome::Inserted(self.insert(new, now)),
            Some((id, Supersession::Replace { action })) => {
                let item = self.item_mut(id).ok_or(StoreError::ItemNotFound(id))?;
                item.action = action;
                item.payload = new.payload;
                EnqueueOutcome::Replaced(item.clone())
            }
            Some((id, Supersession::Cancel)) => {
                self.take(id);
                EnqueueOutcome::Cancelled { removed: id }
            }
            Some((id, Supersession::Duplicate)) => EnqueueOutcome::Duplicate(id),
        };
        Ok(outcome)
    }

    pub(crate) fn get(&self, id: QueueItemId) -> Option<SyncQueueItem> {
        self.item(id).cloned()
    }

    pub(crate) fn list(&self, query: &QueueQuery) -> Vec<SyncQueueItem> {
        self.items
            .values()
            .filter(|item| query.matches(item))
            .cloned()
            .collect()
    }

    /// Due items of `store_id`, at most one per entity. An item is held back
    /// while an older non-terminal item for the same entity exists, so a
    /// rescheduled mutation is never overtaken by a later one.
    pub(crate) fn due(
        &self,
        store_id: &StoreId,
        entity_types: &[EntityType],
        now: Timestamp,
        limit: usize,
    ) -> Vec<SyncQueueItem> {
        let mut heads = HashSet::new();
        let mut due = Vec::new();
        for item in self.items.values() {
            if &item.store_id != store_id || item.status.is_terminal() {
                continue;
            }
            if !heads.insert((item.entity_type, item.entity_id.as_str())) {
                continue;
            }
            if entity_types.contains(&item.entity_type) && item.is_due(now) {
                due.push(item.clone());
            }
        }
        due.sort_by_key(SyncQueueItem::order_key);
        due.truncate(limit);
        due
    }

    /// The oldest non-terminal item queued before `item` for the same entity.
    fn blocked_by(&self, item: &SyncQueueItem) -> Option<&SyncQueueItem> {
        self.items.range(..item.seq).map(|(_, older)| older).find(|older| {
            !older.status.is_terminal()
                && older.same_entity(&item.store_id, item.entity_type, &item.entity_id)
        })
    }

    pub(crate) fn try_lease(
        &mut self,
        id: QueueItemId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> StoreResult<Lease> {
        let candidate = self.item(id).ok_or(StoreError::ItemNotFound(id))?;
        if !candidate.is_due(now) {
            return Err(StoreError::LeaseConflict {
                id,
                actual: candidate.status,
            });
        }
        if self.blocked_by(candidate).is_some() {
            return Err(StoreError::LeaseConflict {
                id,
                actual: candidate.status,
            });
        }

        let token = self.next_lease + 1;
        let leased = {
            let item = self.item_mut(id).ok_or(StoreError::ItemNotFound(id))?;
            item.status = QueueStatus::Processing;
            item.lease_expires_at = Some(lease_until);
            item.lease_token = Some(token);
            item.clone()
        };
        self.next_lease = token;
        Ok(Lease::new(leased, token))
    }

    pub(crate) fn complete(&mut self, lease: &Lease, now: Timestamp) -> StoreResult<SyncQueueItem> {
        let item = self.leased_mut(lease)?;
        release(item, QueueStatus::Completed);
        item.processed_at = Some(now);
        item.last_error = None;
        Ok(item.clone())
    }

    pub(crate) fn reschedule(
        &mut self,
        lease: &Lease,
        retry_count: u32,
        scheduled_at: Timestamp,
        reason: &str,
    ) -> StoreResult<SyncQueueItem> {
        let item = self.leased_mut(lease)?;
        release(item, QueueStatus::Pending);
        item.retry_count = retry_count;
        item.scheduled_at = scheduled_at;
        item.last_error = Some(reason.to_string());
        Ok(item.clone())
    }

    pub(crate) fn fail(
        &mut self,
        lease: &Lease,
        retry_count: u32,
        now: Timestamp,
        reason: &str,
    ) -> StoreResult<SyncQueueItem> {
        let item = self.leased_mut(lease)?;
        release(item, QueueStatus::Failed);
        item.retry_count = retry_count;
        item.processed_at = Some(now);
        item.last_error = Some(reason.to_string());
        Ok(item.clone())
    }

    pub(crate) fn has_expired_leases(&self, now: Timestamp) -> bool {
        self.items.values().any(|item| {
            item.status == QueueStatus::Processing
                && item.lease_expires_at.map_or(false, |deadline| deadline < now)
        })
    }

    pub(crate) fn reclaim_expired(&mut self, now: Timestamp, max_retries: u32) -> Vec<SyncQueueItem> {
        let mut reclaimed = Vec::new();
        for item in self.items.values_mut() {
            if item.status != QueueStatus::Processing {
                continue;
            }
            match item.lease_expires_at {
                Some(deadline) if deadline < now => {}
                _ => continue,
            }

            item.retry_count += 1;
            item.last_error = Some(LEASE_EXPIRED.to_string());
            if item.retry_count > max_retries {
                release(item, QueueStatus::Failed);
                item.processed_at = Some(now);
            } else {
                release(item, QueueStatus::Pending);
                item.scheduled_at = now;
            }
            reclaimed.push(item.clone());
        }
        reclaimed
    }

    pub(crate) fn requeue_failed(
        &mut self,
        id: QueueItemId,
        now: Timestamp,
    ) -> StoreResult<EnqueueOutcome> {
        let status = self
            .item(id)
            .map(|item| item.status)
            .ok_or(StoreError::ItemNotFound(id))?;
        if status != QueueStatus::Failed {
            return Err(StoreError::InvalidTransition {
                id,
                from: status,
                to: QueueStatus::Pending,
            });
        }

        let failed = self.take(id).ok_or(StoreError::ItemNotFound(id))?;
        let fresh = NewQueueItem {
            store_id: failed.store_id,
            entity_type: failed.entity_type,
            entity_id: failed.entity_id,
            action: failed.action,
            payload: failed.payload,
        };
        self.enqueue(fresh, now)
    }

    pub(crate) fn remove(&mut self, id: QueueItemId) -> StoreResult<Option<SyncQueueItem>> {
        match self.item(id).map(|item| item.status) {
            None => Ok(None),
            Some(QueueStatus::Processing) => Err(StoreError::LeaseConflict {
                id,
                actual: QueueStatus::Processing,
            }),
            Some(_) => Ok(self.take(id)),
        }
    }

    pub(crate) fn clear_failed(&mut self, store_id: &StoreId) -> usize {
        self.remove_where(|item| &item.store_id == store_id && item.status == QueueStatus::Failed)
    }

    pub(crate) fn purge_completed(&mut self, before: Timestamp) -> usize {
        self.remove_where(|item| {
            item.status == QueueStatus::Completed && item.processed_at.map_or(false, |t| t < before)
        })
    }

    fn remove_where(&mut self, predicate: impl Fn(&SyncQueueItem) -> bool) -> usize {
        let doomed: Vec<QueueItemId> = self
            .items
            .values()
            .filter(|item| predicate(item))
            .map(|item| item.id)
            .collect();
        for id in &doomed {
            self.take(*id);
        }
        doomed.len()
    }

    pub(crate) fn counts(&self, store_id: Option<&StoreId>) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for item in self.items.values() {
            if store_id.map_or(true, |s| &item.store_id == s) {
                counts.record(item.status);
            }
        }
        counts
    }

    pub(crate) fn last_completed_at(&self, store_id: &StoreId) -> Option<Timestamp> {
        self.items
            .values()
            .filter(|item| &item.store_id == store_id && item.status == QueueStatus::Completed)
            .filter_map(|item| item.processed_at)
            .max()
    }

    pub(crate) fn store_ids(&self) -> Vec<StoreId> {
        self.items
            .values()
            .map(|item| item.store_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Moves a leased item out of `Processing` and drops its lease.
fn release(item: &mut SyncQueueItem, to: QueueStatus) {
    debug_assert!(item.status.can_transition_to(to));
    item.status = to;
    item.lease_expires_at = None;
    item.lease_token = None;
}

/// A queue store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    state: RwLock<QueueState>,
}

impl MemoryQueueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items in the queue.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueueStore for MemoryQueueStore {
    fn enqueue(&self, item: NewQueueItem, now: Timestamp) -> StoreResult<EnqueueOutcome> {
        self.state.write().enqueue(item, now)
    }

    fn get(&self, id: QueueItemId) -> StoreResult<Option<SyncQueueItem>> {
        Ok(self.state.read().get(id))
    }

    fn list(&self, query: &QueueQuery) -> StoreResult<Vec<SyncQueueItem>> {
        Ok(self.state.read().list(query))
    }

    fn due(
        &self,
        store_id: &StoreId,
        entity_types: &[EntityType],
        now: Timestamp,
        limit: usize,
    ) -> StoreResult<Vec<SyncQueueItem>> {
        Ok(self.state.read().due(store_id, entity_types, now, limit))
    }

    fn try_lease(
        &self,
        id: QueueItemId,
        now: Timestamp,
        lease_until: Timestamp,
    ) -> StoreResult<Lease> {
        self.state.write().try_lease(id, now, lease_until)
    }

    fn complete(&self, lease: &Lease, now: Timestamp) -> StoreResult<SyncQueueItem> {
        self.state.write().complete(lease, now)
    }

    fn reschedule(
        &self,
        lease: &Lease,
        retry_count: u32,
        scheduled_at: Timestamp,
        reason: &str,
    ) -> StoreResult<SyncQueueItem> {
        self.state
            .write()
            .reschedule(lease, retry_count, scheduled_at, reason)
    }

    fn fail(
        &self,
        lease: &Lease,
        retry_count: u32,
        now: Timestamp,
        reason: &str,
    ) -> StoreResult<SyncQueueItem> {
        self.state.write().fail(lease, retry_count, now, reason)
    }

    fn reclaim_expired(&self, now: Timestamp, max_retries: u32) -> StoreResult<Vec<SyncQueueItem>> {
        Ok(self.state.write().reclaim_expired(now, max_retries))
    }

    fn requeue_failed(&self, id: QueueItemId, now: Timestamp) -> StoreResult<EnqueueOutcome> {
        self.state.write().requeue_failed(id, now)
    }

    fn remove(&self, id: QueueItemId) -> StoreResult<Option<SyncQueueItem>> {
        self.state.write().remove(id)
    }

    fn clear_failed(&self, store_id: &StoreId) -> StoreResult<usize> {
        Ok(self.state.write().clear_failed(store_id))
    }

    fn purge_completed(&self, before: Timestamp) -> StoreResult<usize> {
        Ok(self.state.write().purge_completed(before))
    }

    fn counts(&self, store_id: Option<&StoreId>) -> StoreResult<QueueCounts> {
        Ok(self.state.read().counts(store_id))
    }

    fn last_completed_at(&self, store_id: &StoreId) -> StoreResult<Option<Timestamp>> {
        Ok(self.state.read().last_completed_at(store_id))
    }

    fn store_ids(&self) -> StoreResult<Vec<StoreId>> {
        Ok(self.state.read().store_ids())
    }
}
