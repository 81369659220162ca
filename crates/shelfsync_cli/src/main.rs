//! ShelfSync CLI
//!
//! Operator tools for a file-backed ShelfSync queue.
//!
//! # Commands
//!
//! - `inspect` - Queue counts per store
//! - `queue` - List queue items
//! - `retry` - Re-enqueue a failed item
//! - `clear-failed` - Drop a store's failed items
//! - `purge` - Drop completed items past retention

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use shelfsync_protocol::QueueStatus;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ShelfSync queue maintenance tools.
#[derive(Parser)]
#[command(name = "shelfsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the queue directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display queue counts per store
    Inspect,

    /// List queue items in FIFO order
    Queue {
        /// Only items of this store
        #[arg(short, long)]
        store: Option<String>,

        /// Only items in this status (pending, processing, completed, failed)
        #[arg(long)]
        status: Option<QueueStatus>,

        /// Maximum number of items to show
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Items to skip
        #[arg(short, long, default_value = "0")]
        offset: usize,
    },

    /// Re-enqueue a failed item as a fresh pending item
    Retry {
        /// Queue item id
        id: String,
    },

    /// Remove every failed item of a store
    ClearFailed {
        /// Store id
        #[arg(short, long)]
        store: String,
    },

    /// Remove completed items older than the retention window
    Purge {
        /// Retention in days
        #[arg(long, default_value = "7")]
        older_than_days: u64,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect => {
            let path = cli.path.ok_or("Queue path required for inspect")?;
            commands::inspect::run(&path, cli.format)?;
        }
        Commands::Queue {
            store,
            status,
            limit,
            offset,
        } => {
            let path = cli.path.ok_or("Queue path required for queue")?;
            commands::queue::run(&path, store, status, limit, offset, cli.format)?;
        }
        Commands::Retry { id } => {
            let path = cli.path.ok_or("Queue path required for retry")?;
            commands::retry::run(&path, &id, cli.format)?;
        }
        Commands::ClearFailed { store } => {
            let path = cli.path.ok_or("Queue path required for clear-failed")?;
            commands::clear_failed::run(&path, &store, cli.format)?;
        }
        Commands::Purge { older_than_days } => {
            let path = cli.path.ok_or("Queue path required for purge")?;
            commands::purge::run(&path, older_than_days, cli.format)?;
        }
        Commands::Version => {
            println!("ShelfSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
