//! # ShelfSync Server
//!
//! Sync endpoint handlers for ShelfSync.
//!
//! This crate provides:
//! - Typed handlers for `POST /sync/trigger`, `GET /sync/status` and
//!   `GET /sync/queue`, plus job lookup and operator queue actions
//! - A bounded registry of background sync jobs
//! - Role based authorization with store scoping
//! - Service lifecycle (periodic scheduler start and shutdown)
//!
//! # Architecture
//!
//! The server owns no storage of its own. Every handler delegates to the
//! [`ReconciliationEngine`](shelfsync_engine::ReconciliationEngine) it was
//! built with, so the HTTP framework in front of it only has to decode the
//! request, pick a [`Principal`] and encode the response:
//!
//! ```rust,ignore
//! use shelfsync_server::{Principal, Role, ServerConfig, SyncServer};
//!
//! let server = SyncServer::new(ServerConfig::default(), engine);
//! server.start();
//!
//! let principal = Principal::new("u1", Role::StoreManager).with_store("s1");
//! let response = server.handle_trigger_json(&principal, body)?;
//! ```
//!
//! # Triggers
//!
//! A trigger never waits for the cycle. It records a job, spawns the cycle on
//! the current tokio runtime and answers with the job id and the store's queue
//! counts at trigger time. Failures of the cycle itself are recorded on the job.

#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod jobs;
mod server;

pub use auth::{authorize, is_permitted, Capability, Principal, Role, StoreScope};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use jobs::{JobRecord, JobRegistry, JobState};
pub use server::SyncServer;
