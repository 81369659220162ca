//! The reconciliation engine.

use crate::cancel::CancelToken;
use crate::client::LabelSystemClient;
use crate::clock::{millis, Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{ExternalError, SyncError, SyncResult};
use crate::status::SyncStatusReporter;
use parking_lot::RwLock;
use shelfsync_protocol::{
    EntityType, NewQueueItem, PullSyncResponse, PushSyncResponse, QueueItemId, StoreConfig,
    StoreId, SyncType,
};
use shelfsync_store::{
    EnqueueOutcome, EntityStore, Lease, LocalEntity, QueueStore, StoreDirectory,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters over the engine's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Pull cycles that finished.
    pub pulls_completed: u64,
    /// Push cycles that finished.
    pub pushes_completed: u64,
    /// Remote records examined.
    pub records_pulled: u64,
    /// Queue items accepted remotely.
    pub items_pushed: u64,
    /// Queue items rescheduled.
    pub items_retried: u64,
    /// Queue items marked failed.
    pub items_failed: u64,
    /// Leases reclaimed after expiry.
    pub leases_reclaimed: u64,
    /// Most recent cycle error.
    pub last_error: Option<String>,
}

/// Result of one sync cycle.
///
/// A phase that ran reports its counters even when it ended early; the error
/// that ended it is kept alongside.
#[derive(Debug, Default)]
pub struct SyncCycleResult {
    /// Pull phase result, if the cycle pulled.
    pub pull: Option<PullSyncResponse>,
    /// Push phase result, if the cycle pushed.
    pub push: Option<PushSyncResponse>,
    /// Error that ended the pull phase.
    pub pull_error: Option<SyncError>,
    /// Error that ended the push phase.
    pub push_error: Option<SyncError>,
    /// Wall time of the cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    /// The first phase error, pull before push.
    pub fn error(&self) -> Option<&SyncError> {
        self.pull_error.as_ref().or(self.push_error.as_ref())
    }

    /// Returns true if every phase that ran finished.
    pub fn is_success(&self) -> bool {
        self.error().is_none()
    }
}

/// How a leased item left `Processing`.
enum Settled {
    Completed,
    Retried,
    Failed,
}

/// Reconciles stores with the external label system.
///
/// Pull applies authoritative article state to local entities; push drains the
/// outbound queue. Both may run concurrently for the same store: pull only
/// creates or updates, and push serializes per item through the queue lease.
pub struct ReconciliationEngine<C: LabelSystemClient> {
    config: SyncConfig,
    queue: Arc<dyn QueueStore>,
    entities: Arc<dyn EntityStore>,
    directory: Arc<dyn StoreDirectory>,
    client: Arc<C>,
    clock: Arc<dyn Clock>,
    stats: RwLock<SyncStats>,
}

impl<C: LabelSystemClient> ReconciliationEngine<C> {
    /// Creates an engine on the system clock.
    pub fn new(
        config: SyncConfig,
        queue: Arc<dyn QueueStore>,
        entities: Arc<dyn EntityStore>,
        directory: Arc<dyn StoreDirectory>,
        client: Arc<C>,
    ) -> Self {
        Self {
            config,
            queue,
            entities,
            directory,
            client,
            clock: Arc::new(SystemClock),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the queue store.
    pub fn queue(&self) -> &Arc<dyn QueueStore> {
        &self.queue
    }

    /// Returns the store directory.
    pub fn directory(&self) -> &Arc<dyn StoreDirectory> {
        &self.directory
    }

    /// Returns the label system client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Current time on the engine's clock.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Read-only status view over this engine's stores.
    pub fn reporter(&self) -> SyncStatusReporter<C> {
        SyncStatusReporter::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.directory),
            Arc::clone(&self.client),
            self.config.request_timeout,
        )
    }

    /// Appends a local mutation to the outbound queue, collapsing it with a
    /// pending item for the same entity where one supersedes the other.
    pub fn enqueue(&self, item: NewQueueItem) -> SyncResult<EnqueueOutcome> {
        let outcome = self.queue.enqueue(item, self.clock.now())?;
        match &outcome {
            EnqueueOutcome::Inserted(item) | EnqueueOutcome::Replaced(item) => debug!(
                store_id = %item.store_id,
                item_id = %item.id,
                action = %item.action,
                outcome = outcome.kind(),
                "enqueued mutation"
            ),
            EnqueueOutcome::Cancelled { removed } => {
                debug!(item_id = %removed, "mutation cancelled pending item")
            }
            EnqueueOutcome::Duplicate(id) => debug!(item_id = %id, "duplicate mutation ignored"),
        }
        Ok(outcome)
    }

    /// Loads a store and checks it can sync.
    fn resolve_store(&self, store_id: &StoreId) -> SyncResult<StoreConfig> {
        let store = self
            .directory
            .get(store_id)?
            .ok_or_else(|| SyncError::StoreNotFound(store_id.clone()))?;
        if !store.sync_enabled {
            return Err(SyncError::SyncDisabled {
                store_id: store_id.clone(),
            });
        }
        if !store.is_configured() {
            return Err(SyncError::NotConfigured {
                store_id: store_id.clone(),
            });
        }
        Ok(store)
    }

    /// Runs an external call under the request timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ExternalError>>,
    ) -> SyncResult<T> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout(timeout)),
        }
    }

    /// Pulls every entity type for a store.
    pub async fn pull(&self, store_id: &StoreId) -> SyncResult<PullSyncResponse> {
        self.pull_with(store_id, &EntityType::ALL, &CancelToken::new())
            .await
    }

    /// Reconciles remote articles into local entities of `entity_types`.
    ///
    /// Each record is classified `created`, `updated` or `unchanged` by its
    /// unique id and content fingerprint and written on its own. Records
    /// without a unique id are `skipped`. Nothing is ever deleted locally, so
    /// repeating a pull with no remote change writes nothing.
    pub async fn pull_with(
        &self,
        store_id: &StoreId,
        entity_types: &[EntityType],
        cancel: &CancelToken,
    ) -> SyncResult<PullSyncResponse> {
        let store = self.resolve_store(store_id)?;
        let mut result = PullSyncResponse::default();
        self.pull_store(&store, entity_types, cancel, &mut result)
            .await?;
        Ok(result)
    }

    /// Pull phase over a resolved store. `result` holds the counts reached so
    /// far if the phase ends early.
    async fn pull_store(
        &self,
        store: &StoreConfig,
        entity_types: &[EntityType],
        cancel: &CancelToken,
        result: &mut PullSyncResponse,
    ) -> SyncResult<()> {
        let store_id = &store.store_id;
        let articles = match self.bounded(self.client.fetch_articles(store)).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(store_id = %store_id, error = %e, "article fetch failed");
                self.stats.write().last_error = Some(e.to_string());
                return Err(e);
            }
        };

        for article in &articles {
            cancel.check()?;

            let Some(unique_id) = store.mapping.unique_id(article) else {
                debug!(store_id = %store_id, article_id = %article.article_id, "article lacks unique id");
                result.total += 1;
                result.skipped += 1;
                continue;
            };
            let entity_type = store.entity_type_for(&unique_id);
            if !entity_types.contains(&entity_type) {
                continue;
            }
            result.total += 1;

            let fields = store.mapping.map_fields(article);
            let now = self.clock.now();
            match self
                .entities
                .find_by_external_id(store_id, entity_type, &unique_id)?
            {
                None => {
                    let entity =
                        LocalEntity::new(store_id.clone(), entity_type, unique_id, fields, now);
                    self.entities.insert(entity)?;
                    result.created += 1;
                }
                Some(mut entity) => {
                    if entity.apply(fields, now) {
                        self.entities.update(entity)?;
                        result.updated += 1;
                    } else {
                        result.unchanged += 1;
                    }
                }
            }
        }

        self.directory.record_sync(store_id, self.clock.now())?;
        {
            let mut stats = self.stats.write();
            stats.pulls_completed += 1;
            stats.records_pulled += result.total;
        }
        info!(
            store_id = %store_id,
            total = result.total,
            created = result.created,
            updated = result.updated,
            unchanged = result.unchanged,
            skipped = result.skipped,
            "pull complete"
        );
        Ok(())
    }

    /// Pushes every entity type for a store.
    pub async fn push(&self, store_id: &StoreId) -> SyncResult<PushSyncResponse> {
        self.push_with(store_id, &EntityType::ALL, &CancelToken::new())
            .await
    }

    /// Drains due pending items of `entity_types` for a store.
    ///
    /// Items are attempted in `(scheduledAt, insertion)` order, each at most
    /// once per call. Items leased by a concurrent push are skipped.
    pub async fn push_with(
        &self,
        store_id: &StoreId,
        entity_types: &[EntityType],
        cancel: &CancelToken,
    ) -> SyncResult<PushSyncResponse> {
        let store = self.resolve_store(store_id)?;
        let mut result = PushSyncResponse::default();
        self.push_store(&store, entity_types, cancel, &mut result)
            .await?;
        Ok(result)
    }

    /// Push phase over a resolved store. `result` holds the counts reached so
    /// far if the phase ends early.
    async fn push_store(
        &self,
        store: &StoreConfig,
        entity_types: &[EntityType],
        cancel: &CancelToken,
        result: &mut PushSyncResponse,
    ) -> SyncResult<()> {
        self.reclaim_expired()?;

        let drained = self.drain(store, entity_types, cancel, result).await;
        {
            let mut stats = self.stats.write();
            if drained.is_ok() {
                stats.pushes_completed += 1;
            }
            stats.items_pushed += result.succeeded;
            stats.items_retried += result.retried;
            stats.items_failed += result.failed;
        }
        drained?;

        if result.succeeded > 0 {
            if let Err(e) = self.purge_completed() {
                warn!(store_id = %store.store_id, error = %e, "purge of completed items failed");
            }
        }
        info!(
            store_id = %store.store_id,
            total = result.total,
            succeeded = result.succeeded,
            retried = result.retried,
            failed = result.failed,
            skipped = result.skipped,
            "push complete"
        );
        Ok(())
    }

    async fn drain(
        &self,
        store: &StoreConfig,
        entity_types: &[EntityType],
        cancel: &CancelToken,
        result: &mut PushSyncResponse,
    ) -> SyncResult<()> {
        let batch_size = self.config.push_batch_size;
        let mut seen = HashSet::new();
        loop {
            cancel.check()?;
            let now = self.clock.now();
            let batch: Vec<QueueItemId> = self
                .queue
                .due(&store.store_id, entity_types, now, seen.len() + batch_size)?
                .into_iter()
                .map(|item| item.id)
                .filter(|id| !seen.contains(id))
                .take(batch_size)
                .collect();
            if batch.is_empty() {
                return Ok(());
            }

            for id in batch {
                cancel.check()?;
                seen.insert(id);
                self.push_item(store, id, result).await?;
            }
        }
    }

    /// Returns items whose lease expired to the queue.
    fn reclaim_expired(&self) -> SyncResult<()> {
        let reclaimed = self
            .queue
            .reclaim_expired(self.clock.now(), self.config.max_retries)?;
        for item in &reclaimed {
            warn!(
                store_id = %item.store_id,
                item_id = %item.id,
                retry_count = item.retry_count,
                status = %item.status,
                "reclaimed expired lease"
            );
        }
        self.stats.write().leases_reclaimed += reclaimed.len() as u64;
        Ok(())
    }

    async fn push_item(
        &self,
        store: &StoreConfig,
        id: QueueItemId,
        result: &mut PushSyncResponse,
    ) -> SyncResult<()> {
        let now = self.clock.now();
        let lease_until = now.saturating_add(millis(self.config.lease_window()));
        let lease = match self.queue.try_lease(id, now, lease_until) {
            Ok(lease) => lease,
            Err(e) if e.is_contention() => {
                debug!(item_id = %id, "item leased elsewhere, skipping");
                result.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        debug!(
            store_id = %store.store_id,
            item_id = %id,
            action = %lease.item().action,
            retry_count = lease.item().retry_count,
            lease_expires_at = ?lease.expires_at(),
            "leased item"
        );
        result.total += 1;

        let outcome = self
            .bounded(self.client.push_mutation(store, lease.item()))
            .await;
        match self.settle(&lease, outcome) {
            Ok(Settled::Completed) => result.succeeded += 1,
            Ok(Settled::Retried) => result.retried += 1,
            Ok(Settled::Failed) => result.failed += 1,
            Err(e) if e.is_conflict() => {
                warn!(item_id = %id, "lease lost before settling; item left to its new owner");
                result.skipped += 1;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Moves a leased item to its next status after an attempt.
    fn settle(&self, lease: &Lease, outcome: SyncResult<()>) -> SyncResult<Settled> {
        let now = self.clock.now();
        let item = lease.item();

        let error = match outcome {
            Ok(()) => {
                self.queue.complete(lease, now)?;
                info!(store_id = %item.store_id, item_id = %item.id, "item completed");
                return Ok(Settled::Completed);
            }
            Err(e) => e,
        };

        if let SyncError::External(ExternalError::Permanent(reason)) = &error {
            self.queue.fail(lease, item.retry_count, now, reason)?;
            warn!(
                store_id = %item.store_id,
                item_id = %item.id,
                retry_count = item.retry_count,
                reason = %reason,
                "item rejected permanently"
            );
            return Ok(Settled::Failed);
        }

        let reason = error.to_string();
        let retry_count = item.retry_count.saturating_add(1);
        if retry_count > self.config.max_retries {
            self.queue.fail(lease, retry_count, now, &reason)?;
            warn!(
                store_id = %item.store_id,
                item_id = %item.id,
                retry_count,
                reason = %reason,
                "item out of retries"
            );
            return Ok(Settled::Failed);
        }

        let delay = self.config.retry.delay_for_retry(retry_count);
        let at = now.saturating_add(millis(delay));
        self.queue.reschedule(lease, retry_count, at, &reason)?;
        debug!(
            store_id = %item.store_id,
            item_id = %item.id,
            retry_count,
            scheduled_at = at,
            reason = %reason,
            "item rescheduled"
        );
        Ok(Settled::Retried)
    }

    /// Runs one cycle of `sync_type` for a store.
    ///
    /// Fails only when the store cannot sync at all or the cycle was cancelled
    /// before it began. A failed pull does not stop the push: queued
    /// mutations still drain, and both phase results and errors are reported
    /// on the cycle. Cancellation during the pull skips the push.
    pub async fn run(
        &self,
        store_id: &StoreId,
        sync_type: SyncType,
        entity_types: &[EntityType],
        cancel: &CancelToken,
    ) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        let store = self.resolve_store(store_id)?;
        cancel.check()?;

        let mut cycle = SyncCycleResult::default();
        if sync_type.includes_pull() {
            let mut pull = PullSyncResponse::default();
            if let Err(e) = self.pull_store(&store, entity_types, cancel, &mut pull).await {
                cycle.pull_error = Some(e);
            }
            cycle.pull = Some(pull);
        }

        let cancelled = matches!(cycle.pull_error, Some(SyncError::Cancelled));
        if sync_type.includes_push() && !cancelled {
            let mut push = PushSyncResponse::default();
            let pushed = match cancel.check() {
                Ok(()) => self.push_store(&store, entity_types, cancel, &mut push).await,
                Err(e) => Err(e),
            };
            if let Err(e) = pushed {
                cycle.push_error = Some(e);
            }
            cycle.push = Some(push);
        }

        if let Some(e) = cycle.error() {
            warn!(store_id = %store_id, sync_type = %sync_type, error = %e, "sync cycle incomplete");
            if !matches!(e, SyncError::Cancelled) {
                self.stats.write().last_error = Some(e.to_string());
            }
        }
        cycle.duration = start.elapsed();
        Ok(cycle)
    }

    /// Pull then push for every entity type.
    pub async fn full(&self, store_id: &StoreId) -> SyncResult<SyncCycleResult> {
        self.run(store_id, SyncType::Full, &EntityType::ALL, &CancelToken::new())
            .await
    }

    /// Re-enqueues a failed item as a fresh pending mutation.
    pub fn retry_failed(&self, id: QueueItemId) -> SyncResult<EnqueueOutcome> {
        let outcome = self.queue.requeue_failed(id, self.clock.now())?;
        info!(item_id = %id, outcome = outcome.kind(), "failed item requeued");
        Ok(outcome)
    }

    /// Removes every failed item of a store.
    pub fn clear_failed(&self, store_id: &StoreId) -> SyncResult<usize> {
        let removed = self.queue.clear_failed(store_id)?;
        info!(store_id = %store_id, removed, "cleared failed items");
        Ok(removed)
    }

    /// Removes completed items older than the retention window.
    pub fn purge_completed(&self) -> SyncResult<usize> {
        let before = self
            .clock
            .now()
            .saturating_sub(millis(self.config.completed_retention));
        let purged = self.queue.purge_completed(before)?;
        if purged > 0 {
            debug!(purged, "purged completed items");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockLabelClient;
    use crate::clock::ManualClock;
    use serde_json::json;
    use shelfsync_protocol::{AimsCredentials, QueueStatus, SyncAction};
    use shelfsync_store::{MemoryEntityStore, MemoryQueueStore, MemoryStoreDirectory};

    struct Fixture {
        engine: ReconciliationEngine<MockLabelClient>,
        client: Arc<MockLabelClient>,
        clock: Arc<ManualClock>,
        directory: Arc<MemoryStoreDirectory>,
    }

    fn aims() -> AimsCredentials {
        AimsCredentials {
            base_url: "https://aims.test".into(),
            company: "ACME".into(),
            api_key: "k".into(),
        }
    }

    fn fixture(config: SyncConfig) -> Fixture {
        let client = Arc::new(MockLabelClient::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let directory = Arc::new(MemoryStoreDirectory::new());
        directory.insert(StoreConfig::new("s1", "S001").with_aims(aims()));
        let engine = ReconciliationEngine::new(
            config,
            Arc::new(MemoryQueueStore::new()),
            Arc::new(MemoryEntityStore::new()),
            directory.clone(),
            Arc::clone(&client),
        )
        .with_clock(clock.clone());
        Fixture {
            engine,
            client,
            clock,
            directory,
        }
    }

    fn s1() -> StoreId {
        StoreId::new("s1")
    }

    fn mutation(entity_id: &str, action: SyncAction) -> NewQueueItem {
        NewQueueItem::new("s1", EntityType::Spaces, entity_id, action, json!({}))
    }

    #[tokio::test]
    async fn unknown_and_unconfigured_stores_short_circuit() {
        let f = fixture(SyncConfig::new());
        assert!(matches!(
            f.engine.pull(&StoreId::new("ghost")).await,
            Err(SyncError::StoreNotFound(_))
        ));

        f.directory.insert(StoreConfig::new("bare", "B"));
        assert!(matches!(
            f.engine.push(&StoreId::new("bare")).await,
            Err(SyncError::NotConfigured { .. })
        ));

        f.directory
            .insert(StoreConfig::new("off", "O").with_aims(aims()).with_sync_enabled(false));
        assert!(matches!(
            f.engine.full(&StoreId::new("off")).await,
            Err(SyncError::SyncDisabled { .. })
        ));
    }

    #[tokio::test]
    async fn transient_failure_reschedules_with_backoff() {
        let f = fixture(SyncConfig::new().with_retry(crate::RetryConfig::new(Duration::from_secs(1))));
        let id = f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap().item().unwrap().id;
        f.client.push_result(Err(ExternalError::transient("503")));

        let result = f.engine.push(&s1()).await.unwrap();
        assert_eq!((result.total, result.retried), (1, 1));

        let item = f.engine.queue().get(id).unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.retry_count, 1);
        assert_eq!(item.scheduled_at, 1_000 + 2_000);

        // Not due yet: nothing is attempted.
        assert_eq!(f.engine.push(&s1()).await.unwrap().total, 0);

        f.clock.advance(Duration::from_secs(2));
        let result = f.engine.push(&s1()).await.unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(f.engine.queue().get(id).unwrap().unwrap().status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn timeouts_count_as_transient() {
        let f = fixture(SyncConfig::new().with_request_timeout(Duration::from_millis(20)));
        let id = f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap().item().unwrap().id;
        f.client.set_delay(Some(Duration::from_millis(200)));

        let result = f.engine.push(&s1()).await.unwrap();
        assert_eq!(result.retried, 1);
        let item = f.engine.queue().get(id).unwrap().unwrap();
        assert!(item.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn retry_ceiling_fails_item() {
        let f = fixture(
            SyncConfig::new()
                .with_max_retries(1)
                .with_retry(crate::RetryConfig::new(Duration::ZERO)),
        );
        let id = f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap().item().unwrap().id;
        f.client.push_result(Err(ExternalError::transient("503")));
        f.client.push_result(Err(ExternalError::transient("503")));

        assert_eq!(f.engine.push(&s1()).await.unwrap().retried, 1);
        assert_eq!(f.engine.push(&s1()).await.unwrap().failed, 1);

        let item = f.engine.queue().get(id).unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
        assert_eq!(item.retry_count, 2);
        assert!(item.processed_at.is_some());
    }

    #[tokio::test]
    async fn rescheduled_items_are_attempted_once_per_push() {
        let f = fixture(SyncConfig::new().with_retry(crate::RetryConfig::new(Duration::ZERO)));
        let id = f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap().item().unwrap().id;
        f.client.push_result(Err(ExternalError::transient("503")));

        let result = f.engine.push(&s1()).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(f.client.push_count(id), 1);
    }

    #[tokio::test]
    async fn cancelled_push_stops_between_items() {
        let f = fixture(SyncConfig::new());
        f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            f.engine.push_with(&s1(), &EntityType::ALL, &cancel).await,
            Err(SyncError::Cancelled)
        ));
        assert!(f.client.pushed().is_empty());
    }

    #[tokio::test]
    async fn expired_leases_are_reclaimed_before_push() {
        let f = fixture(SyncConfig::new().with_lease_duration(Duration::from_secs(60)));
        let id = f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap().item().unwrap().id;
        // A worker that crashed while holding the lease.
        f.engine.queue().try_lease(id, 1_000, 2_000).unwrap();

        f.clock.set(2_001);
        let result = f.engine.push(&s1()).await.unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(f.engine.stats().leases_reclaimed, 1);
        let item = f.engine.queue().get(id).unwrap().unwrap();
        assert_eq!(item.retry_count, 1);
        assert_eq!(item.status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn fetch_failure_is_reported() {
        let f = fixture(SyncConfig::new());
        f.client.set_fetch_error(Some(ExternalError::transient("gateway")));
        let err = f.engine.pull(&s1()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(f.engine.stats().last_error.is_some());
        assert!(f.directory.get(&s1()).unwrap().unwrap().last_aims_sync_at.is_none());
    }

    #[tokio::test]
    async fn failed_pull_still_drains_the_queue() {
        let f = fixture(SyncConfig::new());
        let id = f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap().item().unwrap().id;
        f.client.set_fetch_error(Some(ExternalError::transient("gateway")));

        let cycle = f.engine.full(&s1()).await.unwrap();
        assert!(!cycle.is_success());
        assert!(matches!(cycle.pull_error, Some(SyncError::External(_))));
        assert!(cycle.push_error.is_none());
        assert_eq!(cycle.pull.unwrap().total, 0);
        assert_eq!(cycle.push.unwrap().succeeded, 1);
        assert_eq!(f.engine.queue().get(id).unwrap().unwrap().status, QueueStatus::Completed);

        let stats = f.engine.stats();
        assert_eq!((stats.pulls_completed, stats.pushes_completed), (0, 1));
        assert!(stats.last_error.unwrap().contains("gateway"));
    }

    #[tokio::test]
    async fn cancelled_cycle_does_not_start() {
        let f = fixture(SyncConfig::new());
        f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = f.engine.run(&s1(), SyncType::Full, &EntityType::ALL, &cancel).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(f.client.pushed().is_empty());
    }

    #[tokio::test]
    async fn purge_respects_retention() {
        let f = fixture(SyncConfig::new().with_completed_retention(Duration::from_secs(10)));
        f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap();
        f.engine.push(&s1()).await.unwrap();

        f.clock.advance(Duration::from_secs(5));
        assert_eq!(f.engine.purge_completed().unwrap(), 0);
        f.clock.advance(Duration::from_secs(6));
        assert_eq!(f.engine.purge_completed().unwrap(), 1);
    }

    #[tokio::test]
    async fn push_drops_completed_items_past_retention() {
        let f = fixture(SyncConfig::new().with_completed_retention(Duration::from_secs(10)));
        let old = f.engine.enqueue(mutation("A1", SyncAction::Update)).unwrap().item().unwrap().id;
        f.engine.push(&s1()).await.unwrap();

        f.clock.advance(Duration::from_secs(11));
        let fresh = f.engine.enqueue(mutation("A2", SyncAction::Update)).unwrap().item().unwrap().id;
        assert_eq!(f.engine.push(&s1()).await.unwrap().succeeded, 1);

        assert!(f.engine.queue().get(old).unwrap().is_none());
        assert_eq!(f.engine.queue().get(fresh).unwrap().unwrap().status, QueueStatus::Completed);
    }
}
