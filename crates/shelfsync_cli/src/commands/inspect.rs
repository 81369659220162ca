//! Inspect command implementation.

use super::{emit, open_queue, Format};
use serde::Serialize;
use shelfsync_protocol::{QueueCounts, StoreId, SyncHealth, Timestamp};
use shelfsync_store::QueueStore;
use std::path::Path;

/// Queue inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Queue directory.
    pub path: String,
    /// Per-store summaries, ordered by store id.
    pub stores: Vec<StoreSummary>,
    /// Counts over every store.
    pub total: QueueCounts,
    /// Health derived from `total`.
    pub health: SyncHealth,
}

/// Queue summary of one store.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    /// Store id.
    pub store_id: StoreId,
    /// Counts per status.
    pub counts: QueueCounts,
    /// Health derived from `counts`.
    pub health: SyncHealth,
    /// Most recent completion.
    pub last_completed_at: Option<Timestamp>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    emit(&result, format, print_text_output)
}

/// Collects per-store counts.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;

    let mut stores = Vec::new();
    for store_id in queue.store_ids()? {
        let counts = queue.counts(Some(&store_id))?;
        stores.push(StoreSummary {
            last_completed_at: queue.last_completed_at(&store_id)?,
            health: SyncHealth::from_counts(&counts),
            counts,
            store_id,
        });
    }
    let total = queue.counts(None)?;

    Ok(InspectResult {
        path: path.display().to_string(),
        stores,
        health: SyncHealth::from_counts(&total),
        total,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("ShelfSync Queue Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Stores:");
    if result.stores.is_empty() {
        println!("  (none)");
    }
    for store in &result.stores {
        let c = &store.counts;
        println!(
            "  [{}] pending {}, processing {}, completed {}, failed {} ({:?})",
            store.store_id, c.pending, c.processing, c.completed, c.failed, store.health
        );
        if let Some(at) = store.last_completed_at {
            println!("      last completed at {}", at);
        }
    }
    println!();
    println!("Total:");
    println!("  Pending:    {}", result.total.pending);
    println!("  Processing: {}", result.total.processing);
    println!("  Completed:  {}", result.total.completed);
    println!("  Failed:     {}", result.total.failed);
}
