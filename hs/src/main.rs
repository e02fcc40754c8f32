use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use handlestore::cli::{Cli, Command};
use handlestore::config::Config;
use handlestore::{CallbackHandleSet, HandleStore, SqliteHandleStore};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("handlestore starting: {}", config.store_path.display());
    let store = SqliteHandleStore::open(&config.store_path, config.namespace.as_str())?;

    match cli.command {
        Command::Show => match store.get()? {
            Some(handles) => {
                println!("Namespace: {}", store.namespace().cyan());
                println!("  Registration handle: {}", handles.registration_handle);
                println!("  Client handle: {}", handles.client_handle);
            }
            None => {
                println!("No handles registered in {}", store.namespace());
            }
        },
        Command::Put { registration, client } => {
            let handles = CallbackHandleSet::new(registration, client);
            store.put(&handles)?;
            println!("{} Stored {}", "✓".green(), handles.to_string().cyan());
        }
        Command::Clear => {
            store.clear()?;
            println!("{} Cleared handles in {}", "✓".green(), store.namespace());
        }
    }

    Ok(())
}
