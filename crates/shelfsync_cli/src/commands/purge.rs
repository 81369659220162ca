//! Purge command implementation.

use super::{emit, open_queue, Format};
use serde::Serialize;
use shelfsync_engine::{millis, Clock, SystemClock};
use shelfsync_store::QueueStore;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Purge result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResult {
    /// Completed items processed before this time were removed.
    pub before: u64,
    /// Number of items removed.
    pub purged: usize,
}

/// Runs the purge command.
pub fn run(path: &Path, older_than_days: u64, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let retention = DAY.saturating_mul(u32::try_from(older_than_days).unwrap_or(u32::MAX));
    let before = SystemClock.now().saturating_sub(millis(retention));
    let result = purge(path, before)?;
    emit(&result, format, |r| println!("Purged {} completed items", r.purged))
}

/// Removes completed items processed before `before`.
pub fn purge(path: &Path, before: u64) -> Result<PurgeResult, Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;
    let purged = queue.purge_completed(before)?;
    info!(purged, before, "purged completed items");
    Ok(PurgeResult { before, purged })
}
