//! Periodic full sync of every enabled store.

use crate::cancel::CancelToken;
use crate::client::LabelSystemClient;
use crate::engine::ReconciliationEngine;
use shelfsync_protocol::{EntityType, PullSyncResponse, PushSyncResponse, SyncType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Spawns the periodic sync loop.
pub struct SyncScheduler;

impl SyncScheduler {
    /// Starts a loop that, every `interval`, runs a full cycle for each
    /// sync-enabled, configured store (each in its own task) and then purges
    /// completed items past retention.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<C: LabelSystemClient>(
        engine: Arc<ReconciliationEngine<C>>,
        interval: Duration,
    ) -> SchedulerHandle {
        let cancel = CancelToken::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(engine, interval, cancel.clone(), shutdown_rx));
        SchedulerHandle {
            cancel,
            shutdown_tx,
            task,
        }
    }
}

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    cancel: CancelToken,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancels in-flight cycles between items and waits for the loop to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }

    /// Returns true if the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run<C: LabelSystemClient>(
    engine: Arc<ReconciliationEngine<C>>,
    interval: Duration,
    cancel: CancelToken,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_ms = interval.as_millis() as u64, "sync scheduler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if cancel.is_cancelled() {
            break;
        }
        tick(&engine, &cancel).await;
    }

    info!("sync scheduler stopped");
}

/// Totals over one scheduler tick.
#[derive(Debug, Default)]
struct TickSummary {
    stores: usize,
    incomplete: usize,
    pull: PullSyncResponse,
    push: PushSyncResponse,
}

async fn tick<C: LabelSystemClient>(
    engine: &Arc<ReconciliationEngine<C>>,
    cancel: &CancelToken,
) -> TickSummary {
    let mut summary = TickSummary::default();
    let stores = match engine.directory().list() {
        Ok(stores) => stores,
        Err(e) => {
            warn!(error = %e, "scheduler could not list stores");
            return summary;
        }
    };

    let mut tasks = JoinSet::new();
    for store in stores
        .into_iter()
        .filter(|store| store.sync_enabled && store.is_configured())
    {
        let engine = Arc::clone(engine);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let result = engine
                .run(&store.store_id, SyncType::Full, &EntityType::ALL, &cancel)
                .await;
            (store.store_id, result)
        });
    }
    summary.stores = tasks.len();
    debug!(stores = summary.stores, "scheduler tick");

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((store_id, Ok(cycle))) => {
                if let Some(pull) = &cycle.pull {
                    summary.pull.merge(pull);
                }
                if let Some(push) = &cycle.push {
                    summary.push.merge(push);
                }
                match cycle.error() {
                    None => debug!(
                        store_id = %store_id,
                        duration_ms = cycle.duration.as_millis() as u64,
                        "scheduled sync finished"
                    ),
                    Some(e) => {
                        summary.incomplete += 1;
                        warn!(store_id = %store_id, error = %e, "scheduled sync incomplete")
                    }
                }
            }
            Ok((store_id, Err(e))) => {
                summary.incomplete += 1;
                warn!(store_id = %store_id, error = %e, "scheduled sync failed")
            }
            Err(e) => {
                summary.incomplete += 1;
                warn!(error = %e, "scheduled sync task panicked")
            }
        }
    }

    if let Err(e) = engine.purge_completed() {
        warn!(error = %e, "purge of completed items failed");
    }
    debug!(
        stores = summary.stores,
        incomplete = summary.incomplete,
        pulled = summary.pull.total,
        pushed = summary.push.succeeded,
        "scheduler tick complete"
    );
    summary
}
