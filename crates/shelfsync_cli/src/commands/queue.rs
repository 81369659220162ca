//! Queue listing command.

use super::{emit, open_queue, Format};
use shelfsync_protocol::{QueueListResponse, QueueQuery, QueueStatus, StoreId};
use shelfsync_store::QueueStore;
use std::path::Path;

/// Runs the queue command.
pub fn run(
    path: &Path,
    store: Option<String>,
    status: Option<QueueStatus>,
    limit: usize,
    offset: usize,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let query = QueueQuery {
        store_id: store.map(StoreId::from),
        status,
        offset,
        limit: Some(limit),
    };
    let page = list(path, &query)?;
    emit(&page, format, print_text_output)
}

/// Lists one page of matching items in FIFO order.
pub fn list(path: &Path, query: &QueueQuery) -> Result<QueueListResponse, Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;
    let items = queue.list(query)?;
    let total = items.len();
    let limit = query.limit.unwrap_or(total);
    Ok(QueueListResponse {
        items: items.into_iter().skip(query.offset).take(limit).collect(),
        total,
        offset: query.offset,
        limit,
    })
}

fn print_text_output(page: &QueueListResponse) {
    println!(
        "{} of {} items (offset {})",
        page.items.len(),
        page.total,
        page.offset
    );
    for item in &page.items {
        println!(
            "{}  {:<10} {:<6} {:<10} {:<8} {}  retries={} due={}",
            item.id,
            item.status.as_str(),
            item.store_id.as_str(),
            item.entity_type.as_str(),
            item.action.as_str(),
            item.entity_id,
            item.retry_count,
            item.scheduled_at
        );
        if let Some(error) = &item.last_error {
            println!("    last error: {}", error);
        }
    }
}
