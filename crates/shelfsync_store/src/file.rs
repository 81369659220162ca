//! File-backed queue store.
//!
//! ```text
//! <queue_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! └─ queue.json        # Queue snapshot
//! ```
//!
//! Every mutation is applied to a copy of the in-memory state, written to
//! `queue.json.tmp`, fsynced and renamed over `queue.json`. Only after the
//! rename succeeds does the copy replace the live state, so a failed write
//! leaves both disk and memory at the previous version.

use crate::error::{StoreError, StoreResult};
use crate::memory::{QueueSnapshot, QueueState};
use crate::queue::{EnqueueOutcome, Lease, QueueStore};
use fs2::FileExt;
use parking_lot::RwLock;
use shelfsync_protocol::{
    EntityType, NewQueueItem, QueueCounts, QueueItemId, QueueQuery, StoreId, SyncQueueItem,
    Timestamp,
};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_FILE: &str = "LOCK";
const QUEUE_FILE: &str = "queue.json";
const QUEUE_TEMP: &str = "queue.json.tmp";

/// A queue store persisted to a directory.
///
/// The store holds an exclusive lock on the directory for its lifetime; a
/// second `open` on the same path fails with [`StoreError::Locked`].
///
/// Each transition copies the state and rewrites the whole snapshot, so its
/// cost grows with the number of retained rows. Completed rows are dropped
/// once they pass the engine's retention window; keep that window short for
/// busy stores.
#[derive(Debug)]
pub struct FileQueueStore {
    path: PathBuf,
    state: RwLock<QueueState>,
    _lock_file: File,
}

impl FileQueueStore {
    /// Opens or creates a queue directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `Locked`)
    /// - The snapshot cannot be decoded
    pub fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StoreError::invalid_format(format!(
                    "queue directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(StoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked);
        }

        let state = load(&path.join(QUEUE_FILE))?;
        debug!(path = %path.display(), items = state.len(), "opened queue store");

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(state),
            _lock_file: lock_file,
        })
    }

    /// Returns the queue directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of items in the queue.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `f` to a copy of the state, persists it, then publishes it.
    fn mutate<T>(&self, f: impl FnOnce(&mut QueueState) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let out = f(&mut next)?;
        self.save(&next.to_snapshot())?;
        *state = next;
        Ok(out)
    }

    fn save(&self, snapshot: &QueueSnapshot) -> StoreResult<()> {
        let temp_path = self.path.join(QUEUE_TEMP);
        let data = serde_json::to_vec(snapshot)?;

        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.path.join(QUEUE_FILE))?;
        sync_directory(&self.path)
    }
}

fn load(queue_path: &Path) -> StoreResult<QueueState> {
    if !queue_path.exists() {
        return Ok(QueueState::default());
    }
    let data = fs::read(queue_path)?;
    if data.is_empty() {
        return Ok(QueueState::default());
    }
    let snapshot: QueueSnapshot = serde_json::from_slice(&data)?;
    QueueState::from_snapshot(snapshot)
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> StoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> StoreResult<()> {
    Ok(())
}

impl QueueStore for FileQueueStore {
    fn enqueue(&self, item: NewQueueItem, now: Timestamp) -> StoreResult<EnqueueOutcome> {
        self.mutate(|state| state.enqueue(item, now))
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
        self.mutate(|state| state.try_lease(id, now, lease_until))
    }

    fn complete(&self, lease: &Lease, now: Timestamp) -> StoreResult<SyncQueueItem> {
        self.mutate(|state| state.complete(lease, now))
    }

    fn reschedule(
        &self,
        lease: &Lease,
        retry_count: u32,
        scheduled_at: Timestamp,
        reason: &str,
    ) -> StoreResult<SyncQueueItem> {
        self.mutate(|state| state.reschedule(lease, retry_count, scheduled_at, reason))
    }

    fn fail(
        &self,
        lease: &Lease,
        retry_count: u32,
        now: Timestamp,
        reason: &str,
    ) -> StoreResult<SyncQueueItem> {
        self.mutate(|state| state.fail(lease, retry_count, now, reason))
    }

    fn reclaim_expired(&self, now: Timestamp, max_retries: u32) -> StoreResult<Vec<SyncQueueItem>> {
        let stale = self.state.read().has_expired_leases(now);
        if !stale {
            return Ok(Vec::new());
        }
        self.mutate(|state| Ok(state.reclaim_expired(now, max_retries)))
    }

    fn requeue_failed(&self, id: QueueItemId, now: Timestamp) -> StoreResult<EnqueueOutcome> {
        self.mutate(|state| state.requeue_failed(id, now))
    }

    fn remove(&self, id: QueueItemId) -> StoreResult<Option<SyncQueueItem>> {
        self.mutate(|state| state.remove(id))
    }

    fn clear_failed(&self, store_id: &StoreId) -> StoreResult<usize> {
        self.mutate(|state| Ok(state.clear_failed(store_id)))
    }

    fn purge_completed(&self, before: Timestamp) -> StoreResult<usize> {
        self.mutate(|state| Ok(state.purge_completed(before)))
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelfsync_protocol::{QueueStatus, SyncAction};
    use tempfile::tempdir;

    fn new_item(entity_id: &str) -> NewQueueItem {
        NewQueueItem::new("s1", EntityType::People, entity_id, SyncAction::Update, json!({}))
    }

    #[test]
    fn open_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue");
        let store = FileQueueStore::open(&path, true).unwrap();
        assert!(store.is_empty());
        assert!(path.join(LOCK_FILE).exists());
    }

    #[test]
    fn open_missing_without_create_fails() {
        let dir = tempdir().unwrap();
        let result = FileQueueStore::open(&dir.path().join("absent"), false);
        assert!(matches!(result, Err(StoreError::InvalidFormat { .. })));
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileQueueStore::open(dir.path(), true).unwrap();
        let second = FileQueueStore::open(dir.path(), true);
        assert!(matches!(second, Err(StoreError::Locked)));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let store = FileQueueStore::open(dir.path(), true).unwrap();
            let outcome = store.enqueue(new_item("p1"), 10).unwrap();
            let id = outcome.item().unwrap().id;
            let lease = store.try_lease(id, 10, 100).unwrap();
            store.reschedule(&lease, 1, 500, "timeout").unwrap();
            id
        };

        let store = FileQueueStore::open(dir.path(), false).unwrap();
        let item = store.get(id).unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.retry_count, 1);
        assert_eq!(item.scheduled_at, 500);
        assert_eq!(item.last_error.as_deref(), Some("timeout"));
        assert!(!dir.path().join(QUEUE_TEMP).exists());
    }

    #[test]
    fn failed_mutation_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let store = FileQueueStore::open(dir.path(), true).unwrap();
        store.enqueue(new_item("p1"), 0).unwrap();

        let blank = NewQueueItem::new("s1", EntityType::People, "", SyncAction::Update, json!({}));
        assert!(store.enqueue(blank, 0).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn corrupt_snapshot_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(QUEUE_FILE), b"{not json").unwrap();
        let result = FileQueueStore::open(dir.path(), false);
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
