//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hd - headless event dispatch coordinator
#[derive(Parser)]
#[command(
    name = "hd",
    about = "Headless event dispatch and execution-context lifecycle coordinator",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show config, persisted handles and demo entry points
    Status,

    /// Persist the demo entry point's handle with a client handle
    Register {
        /// Client handle to notify
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        client: i64,
    },

    /// Feed events from producer threads through the coordinator
    Simulate {
        /// Number of producer threads
        #[arg(short, long, default_value_t = 4)]
        producers: usize,

        /// Events emitted per producer
        #[arg(short, long, default_value_t = 25)]
        events: usize,

        /// Use an in-memory handle store instead of the configured one
        #[arg(long)]
        ephemeral: bool,

        /// Seconds to wait for the context to print every event
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("headless")
        .join("logs")
        .join("hd.log")
}
