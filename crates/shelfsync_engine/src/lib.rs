//! # ShelfSync Engine
//!
//! Reconciles each store's local entities with the external AIMS/Solum
//! electronic-shelf-label system.
//!
//! This crate provides:
//! - The reconciliation engine (pull, push, enqueue, operator actions)
//! - The label system client contract, an HTTP adapter and a scripted mock
//! - Exponential backoff without jitter
//! - The sync status reporter
//! - A periodic scheduler with cooperative cancellation
//!
//! ## Architecture
//!
//! Pull is authoritative from the remote side: every article is compared with
//! the local entity by unique id and content fingerprint and written if it is
//! new or changed. Push drains the outbound queue in due order; each item is
//! leased by exactly one worker while in flight.
//!
//! ## Key Invariants
//!
//! - Queue items only move forward through their lifecycle
//! - At most one worker holds an item in `processing`
//! - Every external call is bounded by the request timeout
//! - Pull never deletes local data and is idempotent

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod client;
mod clock;
mod config;
mod engine;
mod error;
mod http;
mod scheduler;
mod status;

pub use cancel::CancelToken;
pub use client::{LabelSystemClient, MockLabelClient};
pub use clock::{millis, Clock, ManualClock, SystemClock};
pub use config::{RetryConfig, SyncConfig};
pub use engine::{ReconciliationEngine, SyncCycleResult, SyncStats};
pub use error::{ExternalError, SyncError, SyncResult};
pub use http::{HttpClient, HttpLabelClient, HttpResponse};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use status::SyncStatusReporter;
