//! Retry command implementation.

use super::{emit, open_queue, Format};
use shelfsync_engine::{Clock, SystemClock};
use shelfsync_protocol::{QueueItemId, SyncQueueItem};
use shelfsync_store::{EnqueueOutcome, QueueStore};
use std::path::Path;
use tracing::info;

/// Runs the retry command.
pub fn run(path: &Path, id: &str, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let item = retry(path, QueueItemId::parse(id)?, SystemClock.now())?;
    emit(&item, format, |item| match item {
        Some(item) => println!("Requeued as {} (pending)", item.id),
        None => println!("Mutation cancelled out against a newer pending item"),
    })
}

/// Re-enqueues a failed item. Returns the pending item now carrying the
/// mutation.
pub fn retry(
    path: &Path,
    id: QueueItemId,
    now: u64,
) -> Result<Option<SyncQueueItem>, Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;
    let outcome = queue.requeue_failed(id, now)?;
    info!(item_id = %id, outcome = outcome.kind(), "failed item requeued");
    Ok(match outcome {
        EnqueueOutcome::Inserted(item) | EnqueueOutcome::Replaced(item) => Some(item),
        EnqueueOutcome::Duplicate(existing) => queue.get(existing)?,
        EnqueueOutcome::Cancelled { .. } => None,
    })
}
