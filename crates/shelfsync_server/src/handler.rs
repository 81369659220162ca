//! Request handlers for the sync endpoints.

use crate::auth::{authorize, Capability, Principal};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::jobs::{JobRecord, JobRegistry};
use shelfsync_engine::{CancelToken, LabelSystemClient, ReconciliationEngine};
use shelfsync_protocol::{
    EntityType, QueueItemId, QueueListResponse, QueueQuery, StoreId, StoreSyncStatusResponse,
    SyncQueueItem, SyncStatusResponse, SyncType, TriggerSyncRequest, TriggerSyncResponse,
};
use shelfsync_store::{EnqueueOutcome, StoreError};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};
use uuid::Uuid;

/// State shared by every handler and by the jobs they spawn.
pub struct HandlerContext<C: LabelSystemClient> {
    /// Server configuration.
    pub config: ServerConfig,
    /// Engine every handler delegates to.
    pub engine: Arc<ReconciliationEngine<C>>,
    /// Triggered jobs.
    pub jobs: JobRegistry,
    cancel: CancelToken,
}

impl<C: LabelSystemClient> HandlerContext<C> {
    /// Creates a handler context.
    pub fn new(config: ServerConfig, engine: Arc<ReconciliationEngine<C>>) -> Self {
        let jobs = JobRegistry::new(config.job_history);
        Self {
            config,
            engine,
            jobs,
            cancel: CancelToken::new(),
        }
    }

    /// Token observed by every job spawned from this context.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    async fn run_job(
        &self,
        job_id: Uuid,
        store_id: StoreId,
        sync_type: SyncType,
        entity_types: Vec<EntityType>,
    ) {
        self.jobs.start(job_id, self.engine.now());
        info!(job_id = %job_id, store_id = %store_id, sync_type = %sync_type, "sync job started");

        let result = self
            .engine
            .run(&store_id, sync_type, &entity_types, &self.cancel)
            .await;
        match result.as_ref().map(|cycle| (cycle, cycle.error())) {
            Ok((cycle, None)) => info!(
                job_id = %job_id,
                store_id = %store_id,
                duration_ms = cycle.duration.as_millis() as u64,
                "sync job completed"
            ),
            Ok((_, Some(e))) | Err(e) => {
                warn!(job_id = %job_id, store_id = %store_id, error = %e, "sync job failed")
            }
        }
        self.jobs.finish(job_id, &result, self.engine.now());
    }
}

/// Handler for sync requests.
pub struct RequestHandler<C: LabelSystemClient> {
    context: Arc<HandlerContext<C>>,
}

impl<C: LabelSystemClient> RequestHandler<C> {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext<C>>) -> Self {
        Self { context }
    }

    /// Handles `POST /sync/trigger`.
    ///
    /// Returns as soon as the job is recorded; the cycle runs on the current
    /// tokio runtime and its outcome is stored on the job.
    pub fn handle_trigger(
        &self,
        principal: &Principal,
        request: TriggerSyncRequest,
    ) -> ServerResult<TriggerSyncResponse> {
        request.validate()?;
        authorize(principal, Capability::TriggerSync, Some(&request.store_id))?;

        let engine = &self.context.engine;
        if engine.directory().get(&request.store_id)?.is_none() {
            return Err(ServerError::StoreNotFound(request.store_id));
        }
        let runtime = Handle::try_current()
            .map_err(|e| ServerError::Internal(format!("no async runtime: {}", e)))?;

        let stats = engine.queue().counts(Some(&request.store_id))?;
        let job_id = self
            .context
            .jobs
            .create(request.store_id.clone(), request.sync_type, engine.now())
            .job_id;
        let entity_types = request.entity_filter();
        let TriggerSyncRequest {
            store_id,
            sync_type,
            ..
        } = request;

        info!(
            job_id = %job_id,
            store_id = %store_id,
            sync_type = %sync_type,
            user = %principal.user_id,
            "sync triggered"
        );
        let message = format!("{} sync started for store {}", sync_type, store_id);
        let context = Arc::clone(&self.context);
        runtime.spawn(async move {
            context
                .run_job(job_id, store_id, sync_type, entity_types)
                .await
        });

        Ok(TriggerSyncResponse {
            message,
            job_id,
            stats,
        })
    }

    /// Handles `POST /sync/trigger` with a raw JSON body.
    pub fn handle_trigger_json(
        &self,
        principal: &Principal,
        body: &[u8],
    ) -> ServerResult<TriggerSyncResponse> {
        let request = TriggerSyncRequest::from_json(body)?;
        self.handle_trigger(principal, request)
    }

    /// Handles `GET /sync/status` without a store: every store in scope.
    pub async fn handle_status(&self, principal: &Principal) -> ServerResult<SyncStatusResponse> {
        authorize(principal, Capability::ViewSyncStatus, None)?;
        let status = self.context.engine.reporter().overall_status().await?;
        let stores = status
            .stores
            .into_iter()
            .filter(|store| principal.can_access(&store.store_id))
            .collect();
        Ok(SyncStatusResponse::from_stores(stores))
    }

    /// Handles `GET /sync/status?storeId=`.
    pub async fn handle_store_status(
        &self,
        principal: &Principal,
        store_id: &StoreId,
    ) -> ServerResult<StoreSyncStatusResponse> {
        authorize(principal, Capability::ViewSyncStatus, Some(store_id))?;
        Ok(self.context.engine.reporter().store_status(store_id).await?)
    }

    /// Handles `GET /sync/queue`: FIFO, paged.
    pub fn handle_queue(
        &self,
        principal: &Principal,
        query: &QueueQuery,
    ) -> ServerResult<QueueListResponse> {
        authorize(principal, Capability::ViewSyncQueue, query.store_id.as_ref())?;

        let mut items = self.context.engine.queue().list(query)?;
        items.retain(|item| principal.can_access(&item.store_id));

        let total = items.len();
        let limit = self.context.config.page_size(query.limit);
        let items = items.into_iter().skip(query.offset).take(limit).collect();
        Ok(QueueListResponse {
            items,
            total,
            offset: query.offset,
            limit,
        })
    }

    /// Handles `GET /sync/jobs/{id}`.
    pub fn handle_job(&self, principal: &Principal, job_id: Uuid) -> ServerResult<JobRecord> {
        let job = self
            .context
            .jobs
            .get(job_id)
            .ok_or(ServerError::JobNotFound(job_id))?;
        authorize(principal, Capability::ViewSyncStatus, Some(&job.store_id))?;
        Ok(job)
    }

    /// Handles `GET /sync/jobs?storeId=`: remembered jobs, newest first.
    pub fn handle_jobs(
        &self,
        principal: &Principal,
        store_id: Option<&StoreId>,
    ) -> ServerResult<Vec<JobRecord>> {
        authorize(principal, Capability::ViewSyncStatus, store_id)?;
        let mut jobs = self.context.jobs.recent(store_id);
        jobs.retain(|job| principal.can_access(&job.store_id));
        Ok(jobs)
    }

    /// Handles `POST /sync/queue/{id}/retry`.
    ///
    /// Returns the pending item now carrying the mutation, or `None` when the
    /// retried mutation cancelled out against a newer pending one.
    pub fn handle_retry(
        &self,
        principal: &Principal,
        id: QueueItemId,
    ) -> ServerResult<Option<SyncQueueItem>> {
        let queue = self.context.engine.queue();
        let item = queue.get(id)?.ok_or(StoreError::ItemNotFound(id))?;
        authorize(principal, Capability::ManageSyncQueue, Some(&item.store_id))?;

        Ok(match self.context.engine.retry_failed(id)? {
            EnqueueOutcome::Inserted(item) | EnqueueOutcome::Replaced(item) => Some(item),
            EnqueueOutcome::Duplicate(existing) => queue.get(existing)?,
            EnqueueOutcome::Cancelled { .. } => None,
        })
    }

    /// Handles `DELETE /sync/queue/failed?storeId=`. Returns the number of
    /// items removed.
    pub fn handle_clear_failed(
        &self,
        principal: &Principal,
        store_id: &StoreId,
    ) -> ServerResult<usize> {
        authorize(principal, Capability::ManageSyncQueue, Some(store_id))?;
        Ok(self.context.engine.clear_failed(store_id)?)
    }
}
