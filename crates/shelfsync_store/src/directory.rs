//! Store directory: which stores exist and how they sync.

use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use shelfsync_protocol::{StoreConfig, StoreId, Timestamp};
use std::collections::BTreeMap;

/// Lookup of per-store sync settings.
pub trait StoreDirectory: Send + Sync {
    /// Fetches one store's settings.
    fn get(&self, store_id: &StoreId) -> StoreResult<Option<StoreConfig>>;

    /// Lists every store, ordered by id.
    fn list(&self) -> StoreResult<Vec<StoreConfig>>;

    /// Records a successful sync of `store_id` at `at`.
    ///
    /// The recorded time never moves backwards.
    fn record_sync(&self, store_id: &StoreId, at: Timestamp) -> StoreResult<()>;
}

/// In-memory store directory.
#[derive(Debug, Default)]
pub struct MemoryStoreDirectory {
    stores: RwLock<BTreeMap<StoreId, StoreConfig>>,
}

impl MemoryStoreDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a store.
    pub fn insert(&self, config: StoreConfig) {
        self.stores.write().insert(config.store_id.clone(), config);
    }

    /// Removes a store.
    pub fn remove(&self, store_id: &StoreId) -> Option<StoreConfig> {
        self.stores.write().remove(store_id)
    }
}

impl FromIterator<StoreConfig> for MemoryStoreDirectory {
    fn from_iter<I: IntoIterator<Item = StoreConfig>>(iter: I) -> Self {
        let directory = Self::new();
        for config in iter {
            directory.insert(config);
        }
        directory
    }
}

impl StoreDirectory for MemoryStoreDirectory {
    fn get(&self, store_id: &StoreId) -> StoreResult<Option<StoreConfig>> {
        Ok(self.stores.read().get(store_id).cloned())
    }

    fn list(&self) -> StoreResult<Vec<StoreConfig>> {
        Ok(self.stores.read().values().cloned().collect())
    }

    fn record_sync(&self, store_id: &StoreId, at: Timestamp) -> StoreResult<()> {
        let mut stores = self.stores.write();
        let config = stores
            .get_mut(store_id)
            .ok_or_else(|| StoreError::StoreNotFound(store_id.clone()))?;
        config.last_aims_sync_at = Some(config.last_aims_sync_at.map_or(at, |prev| prev.max(at)));
        Ok(())
    }
}
