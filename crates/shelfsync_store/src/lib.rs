//! # ShelfSync Store
//!
//! Storage for the sync queue, reconciled local entities and the store
//! directory.
//!
//! This crate provides:
//! - [`QueueStore`]: the outbound queue with compare-and-set leasing
//! - [`MemoryQueueStore`] and the directory-backed [`FileQueueStore`]
//! - [`EntityStore`] with content fingerprints for pull reconciliation
//! - [`StoreDirectory`] for per-store sync settings
//!
//! Every queue method is atomic with respect to every other; only the
//! lease holder can move an item out of `Processing`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod entity;
mod error;
mod file;
mod memory;
mod queue;

pub use directory::{MemoryStoreDirectory, StoreDirectory};
pub use entity::{fingerprint, EntityStore, LocalEntity, MemoryEntityStore};
pub use error::{StoreError, StoreResult};
pub use file::FileQueueStore;
pub use memory::MemoryQueueStore;
pub use queue::{EnqueueOutcome, Lease, QueueStore};
