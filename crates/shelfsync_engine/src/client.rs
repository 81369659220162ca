//! External label system client contract.

use crate::error::ExternalError;
use parking_lot::Mutex;
use shelfsync_protocol::{QueueItemId, RemoteArticle, StoreConfig, StoreId, SyncQueueItem};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Client of the external AIMS/Solum label system.
///
/// This trait abstracts the network layer so the engine can run against the
/// HTTP adapter in production and a scripted mock in tests. Callers bound every
/// call with a timeout; implementations need not.
pub trait LabelSystemClient: Send + Sync + 'static {
    /// Fetches the authoritative article list for a store.
    fn fetch_articles(
        &self,
        store: &StoreConfig,
    ) -> impl Future<Output = Result<Vec<RemoteArticle>, ExternalError>> + Send;

    /// Applies one queued mutation remotely.
    fn push_mutation(
        &self,
        store: &StoreConfig,
        item: &SyncQueueItem,
    ) -> impl Future<Output = Result<(), ExternalError>> + Send;

    /// Checks that the store's tenant is reachable.
    fn is_connected(&self, store: &StoreConfig) -> impl Future<Output = bool> + Send;
}

/// A scripted client for tests.
///
/// Pushes succeed unless a result was scripted with [`MockLabelClient::push_result`]
/// or the entity was rejected with [`MockLabelClient::reject_entity`].
#[derive(Debug)]
pub struct MockLabelClient {
    connected: AtomicBool,
    articles: Mutex<HashMap<StoreId, Vec<RemoteArticle>>>,
    fetch_error: Mutex<Option<ExternalError>>,
    push_results: Mutex<VecDeque<Result<(), ExternalError>>>,
    rejected: Mutex<HashMap<String, ExternalError>>,
    pushed: Mutex<Vec<SyncQueueItem>>,
    delay: Mutex<Option<Duration>>,
}

impl MockLabelClient {
    /// Creates a connected client with no articles.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            articles: Mutex::new(HashMap::new()),
            fetch_error: Mutex::new(None),
            push_results: Mutex::new(VecDeque::new()),
            rejected: Mutex::new(HashMap::new()),
            pushed: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }

    /// Sets the articles returned for a store.
    pub fn set_articles(&self, store_id: impl Into<StoreId>, articles: Vec<RemoteArticle>) {
        self.articles.lock().insert(store_id.into(), articles);
    }

    /// Makes every fetch fail with `error`; `None` clears it.
    pub fn set_fetch_error(&self, error: Option<ExternalError>) {
        *self.fetch_error.lock() = error;
    }

    /// Scripts the result of the next push.
    pub fn push_result(&self, result: Result<(), ExternalError>) {
        self.push_results.lock().push_back(result);
    }

    /// Fails every push for `entity_id` with `error`.
    pub fn reject_entity(&self, entity_id: impl Into<String>, error: ExternalError) {
        self.rejected.lock().insert(entity_id.into(), error);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Delays every call by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Every item submitted so far, in submission order.
    pub fn pushed(&self) -> Vec<SyncQueueItem> {
        self.pushed.lock().clone()
    }

    /// Number of times `id` was submitted.
    pub fn push_count(&self, id: QueueItemId) -> usize {
        self.pushed.lock().iter().filter(|item| item.id == id).count()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockLabelClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelSystemClient for MockLabelClient {
    async fn fetch_articles(&self, store: &StoreConfig) -> Result<Vec<RemoteArticle>, ExternalError> {
        self.pause().await;
        if let Some(error) = self.fetch_error.lock().clone() {
            return Err(error);
        }
        Ok(self
            .articles
            .lock()
            .get(&store.store_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_mutation(
        &self,
        _store: &StoreConfig,
        item: &SyncQueueItem,
    ) -> Result<(), ExternalError> {
        self.pushed.lock().push(item.clone());
        self.pause().await;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ExternalError::transient("not connected"));
        }
        if let Some(error) = self.rejected.lock().get(&item.entity_id).cloned() {
            return Err(error);
        }
        let scripted = self.push_results.lock().pop_front();
        scripted.unwrap_or(Ok(()))
    }

    async fn is_connected(&self, _store: &StoreConfig) -> bool {
        self.pause().await;
        self.connected.load(Ordering::SeqCst)
    }
}
