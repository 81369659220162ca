//! Clear-failed command implementation.

use super::{emit, open_queue, Format};
use serde::Serialize;
use shelfsync_protocol::StoreId;
use shelfsync_store::QueueStore;
use std::path::Path;
use tracing::info;

/// Clear-failed result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResult {
    /// Store whose failed items were removed.
    pub store_id: StoreId,
    /// Number of items removed.
    pub removed: usize,
}

/// Runs the clear-failed command.
pub fn run(path: &Path, store: &str, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = clear(path, &StoreId::new(store))?;
    emit(&result, format, |r| {
        println!("Removed {} failed items from store {}", r.removed, r.store_id)
    })
}

/// Removes every failed item of `store_id`.
pub fn clear(path: &Path, store_id: &StoreId) -> Result<ClearResult, Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;
    let removed = queue.clear_failed(store_id)?;
    info!(store_id = %store_id, removed, "cleared failed items");
    Ok(ClearResult {
        store_id: store_id.clone(),
        removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seed;
    use shelfsync_store::FileQueueStore;

    #[test]
    fn only_the_named_store() {
        let dir = tempfile::tempdir().unwrap();
        seed(
            dir.path(),
            &[
                ("s1", "A1", "failed", 10),
                ("s1", "A2", "pending", 0),
                ("s2", "A1", "failed", 10),
            ],
        );

        assert_eq!(clear(dir.path(), &StoreId::new("s1")).unwrap().removed, 1);

        let queue = FileQueueStore::open(dir.path(), false).unwrap();
        assert_eq!(queue.counts(Some(&StoreId::new("s1"))).unwrap().pending, 1);
        assert_eq!(queue.counts(Some(&StoreId::new("s2"))).unwrap().failed, 1);
    }
}
