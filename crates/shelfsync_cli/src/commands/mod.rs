//! CLI command implementations.

pub mod clear_failed;
pub mod inspect;
pub mod purge;
pub mod queue;
pub mod retry;

use clap::ValueEnum;
use serde::Serialize;
use shelfsync_store::FileQueueStore;
use std::path::Path;

/// Output format of every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens an existing queue directory.
pub fn open_queue(path: &Path) -> Result<FileQueueStore, Box<dyn std::error::Error>> {
    if !path.join("queue.json").exists() {
        return Err(format!("No queue found at {:?}", path).into());
    }
    Ok(FileQueueStore::open(path, false)?)
}

/// Prints `value` as JSON, or calls `text` to print it for humans.
pub fn emit<T: Serialize>(
    value: &T,
    format: Format,
    text: impl FnOnce(&T),
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Text => text(value),
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use serde_json::json;
    use shelfsync_protocol::{EntityType, NewQueueItem, QueueItemId, SyncAction};
    use shelfsync_store::{FileQueueStore, QueueStore};
    use std::path::Path;

    /// Seeds a queue directory: for each entry, an item of `store` that ends
    /// up pending, completed at `at`, or failed.
    pub fn seed(path: &Path, items: &[(&str, &str, &str, u64)]) -> Vec<QueueItemId> {
        let queue = FileQueueStore::open(path, true).unwrap();
        items
            .iter()
            .map(|(store, entity, outcome, at)| {
                let new = NewQueueItem::new(*store, EntityType::Spaces, *entity, SyncAction::Update, json!({}));
                let id = queue.enqueue(new, 0).unwrap().item().unwrap().id;
                match *outcome {
                    "completed" => {
                        let lease = queue.try_lease(id, 0, 1_000).unwrap();
                        queue.complete(&lease, *at).unwrap();
                    }
                    "failed" => {
                        let lease = queue.try_lease(id, 0, 1_000).unwrap();
                        queue.fail(&lease, 0, *at, "rejected").unwrap();
                    }
                    _ => {}
                }
                id
            })
            .collect()
    }
}
