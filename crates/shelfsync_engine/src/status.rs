//! Read-only sync status view.

use crate::client::LabelSystemClient;
use crate::error::{SyncError, SyncResult};
use shelfsync_protocol::{
    StoreConfig, StoreId, StoreSyncStatusResponse, SyncHealth, SyncStatusResponse,
};
use shelfsync_store::{QueueStore, StoreDirectory};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::warn;

/// Derives status responses from queue and directory state.
///
/// Never writes. The only external call is the bounded connectivity probe.
pub struct SyncStatusReporter<C: LabelSystemClient> {
    queue: Arc<dyn QueueStore>,
    directory: Arc<dyn StoreDirectory>,
    client: Arc<C>,
    probe_timeout: Duration,
}

impl<C: LabelSystemClient> SyncStatusReporter<C> {
    /// Creates a reporter.
    pub fn new(
        queue: Arc<dyn QueueStore>,
        directory: Arc<dyn StoreDirectory>,
        client: Arc<C>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            directory,
            client,
            probe_timeout,
        }
    }

    /// Status of one store.
    pub async fn store_status(&self, store_id: &StoreId) -> SyncResult<StoreSyncStatusResponse> {
        let store = self
            .directory
            .get(store_id)?
            .ok_or_else(|| SyncError::StoreNotFound(store_id.clone()))?;
        let connected = reachable(self.client.as_ref(), &store, self.probe_timeout).await;
        self.describe(&store, connected)
    }

    /// Status of every store in the directory.
    ///
    /// Stores are checked concurrently, so the call takes about one request
    /// timeout however many stores are unreachable.
    pub async fn overall_status(&self) -> SyncResult<SyncStatusResponse> {
        let stores = self.directory.list()?;

        let mut checks = JoinSet::new();
        for (index, store) in stores.iter().enumerate() {
            let client = Arc::clone(&self.client);
            let store = store.clone();
            let timeout = self.probe_timeout;
            checks.spawn(async move { (index, reachable(client.as_ref(), &store, timeout).await) });
        }
        let mut connected = vec![false; stores.len()];
        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok((index, up)) => connected[index] = up,
                Err(e) => warn!(error = %e, "connectivity check task failed"),
            }
        }

        let statuses = stores
            .iter()
            .zip(connected)
            .map(|(store, up)| self.describe(store, up))
            .collect::<SyncResult<Vec<_>>>()?;
        Ok(SyncStatusResponse::from_stores(statuses))
    }

    fn describe(&self, store: &StoreConfig, aims_connected: bool) -> SyncResult<StoreSyncStatusResponse> {
        let queue = self.queue.counts(Some(&store.store_id))?;
        let last_completed = self.queue.last_completed_at(&store.store_id)?;
        let last_sync_at = match (last_completed, store.last_aims_sync_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        Ok(StoreSyncStatusResponse {
            store_id: store.store_id.clone(),
            sync_enabled: store.sync_enabled,
            aims_connected,
            last_sync_at,
            health: SyncHealth::from_counts(&queue),
            queue,
        })
    }
}

/// Credentials present and the tenant answers within the timeout.
async fn reachable<C: LabelSystemClient>(client: &C, store: &StoreConfig, timeout: Duration) -> bool {
    if !store.is_configured() {
        return false;
    }
    tokio::time::timeout(timeout, client.is_connected(store))
        .await
        .unwrap_or(false)
}
