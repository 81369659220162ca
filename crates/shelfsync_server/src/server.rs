//! Sync service lifecycle.

use crate::auth::Principal;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::jobs::{JobRecord, JobRegistry};
use parking_lot::Mutex;
use shelfsync_engine::{LabelSystemClient, ReconciliationEngine, SchedulerHandle, SyncScheduler};
use shelfsync_protocol::{
    QueueItemId, QueueListResponse, QueueQuery, StoreId, StoreSyncStatusResponse, SyncQueueItem,
    SyncStatusResponse, TriggerSyncRequest, TriggerSyncResponse,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;
use uuid::Uuid;

/// The sync service.
///
/// Wraps a [`ReconciliationEngine`] with the endpoint handlers, the job
/// registry and the optional periodic scheduler. The engine and its stores
/// are built by the caller and injected; [`SyncServer::shutdown`] stops the
/// scheduler and cancels running jobs between items.
///
/// # Example
///
/// ```rust,ignore
/// use shelfsync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default(), Arc::new(engine));
/// server.start()?;
///
/// // An HTTP layer maps requests onto handle_trigger_json(), handle_status(),
/// // handle_queue() and friends.
///
/// server.shutdown().await;
/// ```
pub struct SyncServer<C: LabelSystemClient> {
    handler: RequestHandler<C>,
    context: Arc<HandlerContext<C>>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl<C: LabelSystemClient> SyncServer<C> {
    /// Creates a new sync server around `engine`.
    pub fn new(config: ServerConfig, engine: Arc<ReconciliationEngine<C>>) -> Self {
        let context = Arc::new(HandlerContext::new(config, engine));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            scheduler: Mutex::new(None),
        }
    }

    /// Starts the periodic scheduler when the engine has a sync interval.
    ///
    /// Returns true if a scheduler is running afterwards. Must be called
    /// within a tokio runtime.
    pub fn start(&self) -> ServerResult<bool> {
        let Some(interval) = self.context.engine.config().sync_interval else {
            return Ok(false);
        };
        Handle::try_current()
            .map_err(|e| ServerError::Internal(format!("no async runtime: {}", e)))?;

        let mut scheduler = self.scheduler.lock();
        if scheduler.is_none() {
            *scheduler = Some(SyncScheduler::spawn(
                Arc::clone(&self.context.engine),
                interval,
            ));
            info!("sync server started");
        }
        Ok(true)
    }

    /// Stops the scheduler and cancels running jobs.
    pub async fn shutdown(&self) {
        self.context.cancel_token().cancel();
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
        info!("sync server stopped");
    }

    /// Returns true if the periodic scheduler is running.
    pub fn is_scheduling(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .map_or(false, |scheduler| !scheduler.is_finished())
    }

    /// The engine behind the handlers.
    pub fn engine(&self) -> &Arc<ReconciliationEngine<C>> {
        &self.context.engine
    }

    /// Triggered jobs.
    pub fn jobs(&self) -> &JobRegistry {
        &self.context.jobs
    }

    /// Handles a trigger.
    pub fn handle_trigger(
        &self,
        principal: &Principal,
        request: TriggerSyncRequest,
    ) -> ServerResult<TriggerSyncResponse> {
        self.handler.handle_trigger(principal, request)
    }

    /// Handles a trigger with a raw JSON body.
    pub fn handle_trigger_json(
        &self,
        principal: &Principal,
        body: &[u8],
    ) -> ServerResult<TriggerSyncResponse> {
        self.handler.handle_trigger_json(principal, body)
    }

    /// Handles an overall status request.
    pub async fn handle_status(&self, principal: &Principal) -> ServerResult<SyncStatusResponse> {
        self.handler.handle_status(principal).await
    }

    /// Handles a per-store status request.
    pub async fn handle_store_status(
        &self,
        principal: &Principal,
        store_id: &StoreId,
    ) -> ServerResult<StoreSyncStatusResponse> {
        self.handler.handle_store_status(principal, store_id).await
    }

    /// Handles a queue listing.
    pub fn handle_queue(
        &self,
        principal: &Principal,
        query: &QueueQuery,
    ) -> ServerResult<QueueListResponse> {
        self.handler.handle_queue(principal, query)
    }

    /// Handles a job lookup.
    pub fn handle_job(&self, principal: &Principal, job_id: Uuid) -> ServerResult<JobRecord> {
        self.handler.handle_job(principal, job_id)
    }

    /// Handles a job listing.
    pub fn handle_jobs(
        &self,
        principal: &Principal,
        store_id: Option<&StoreId>,
    ) -> ServerResult<Vec<JobRecord>> {
        self.handler.handle_jobs(principal, store_id)
    }

    /// Handles an operator retry of a failed item.
    pub fn handle_retry(
        &self,
        principal: &Principal,
        id: QueueItemId,
    ) -> ServerResult<Option<SyncQueueItem>> {
        self.handler.handle_retry(principal, id)
    }

    /// Handles clearing a store's failed items.
    pub fn handle_clear_failed(
        &self,
        principal: &Principal,
        store_id: &StoreId,
    ) -> ServerResult<usize> {
        self.handler.handle_clear_failed(principal, store_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfsync_engine::{MockLabelClient, SyncConfig};
    use shelfsync_store::{MemoryEntityStore, MemoryQueueStore, MemoryStoreDirectory};
    use std::time::Duration;

    fn server(config: SyncConfig) -> SyncServer<MockLabelClient> {
        let engine = ReconciliationEngine::new(
            config,
            Arc::new(MemoryQueueStore::new()),
            Arc::new(MemoryEntityStore::new()),
            Arc::new(MemoryStoreDirectory::new()),
            Arc::new(MockLabelClient::new()),
        );
        SyncServer::new(ServerConfig::default(), Arc::new(engine))
    }

    #[tokio::test]
    async fn server_lifecycle() {
        let server = server(SyncConfig::new().with_sync_interval(Duration::from_secs(3600)));
        assert!(!server.is_scheduling());
        assert!(server.start().unwrap());
        // Starting twice keeps the one scheduler.
        assert!(server.start().unwrap());
        assert!(server.is_scheduling());

        server.shutdown().await;
        assert!(!server.is_scheduling());
        assert!(server.context.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn no_interval_means_no_scheduler() {
        let server = server(SyncConfig::new());
        assert!(!server.start().unwrap());
        assert!(!server.is_scheduling());
        assert!(server.jobs().is_empty());
        server.shutdown().await;
    }
}
