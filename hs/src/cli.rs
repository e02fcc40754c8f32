//! CLI argument parsing for handlestore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hs")]
#[command(author, version, about = "Inspect and edit persisted headless callback handles", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the persisted handle pair
    Show,

    /// Persist a handle pair, replacing any existing one
    Put {
        /// Registration (entry point) handle
        #[arg(required = true, allow_negative_numbers = true)]
        registration: i64,

        /// Client handle
        #[arg(required = true, allow_negative_numbers = true)]
        client: i64,
    },

    /// Remove the persisted handle pair
    Clear,
}
