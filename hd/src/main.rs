//! hd - headless coordinator demo and inspection CLI

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use eyre::{Context, Result, eyre};
use handlestore::{HandleStore, MemoryHandleStore, SqliteHandleStore};
use tracing::{debug, info, warn};

use headless::cli::{Cli, Command, get_log_path};
use headless::config::Config;
use headless::demo::{DEMO_ENTRY_POINT, demo_event, demo_registry};
use headless::{EntryPointRegistry, HeadlessCoordinator, InMemoryEngine};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_thread_names(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        None | Some(Command::Status) => cmd_status(&config),
        Some(Command::Register { client }) => cmd_register(&config, client),
        Some(Command::Simulate {
            producers,
            events,
            ephemeral,
            timeout,
        }) => cmd_simulate(&config, producers, events, ephemeral, Duration::from_secs(timeout)).await,
    }
}

fn open_store(config: &Config) -> Result<SqliteHandleStore> {
    SqliteHandleStore::open(&config.store.path, config.store.namespace.clone())
        .with_context(|| format!("Failed to open handle store at {}", config.store.path.display()))
}

fn cmd_status(config: &Config) -> Result<()> {
    debug!("cmd_status: called");
    println!("Config:");
    print!("{}", serde_yaml::to_string(config)?);

    let store = open_store(config)?;
    println!();
    println!("Handle store: {} [{}]", store.db_path().display(), store.namespace());
    match store.get()? {
        Some(handles) => println!("  {}", handles),
        None => println!("  no headless task registered"),
    }

    println!();
    println!("Entry points:");
    let registry = demo_registry(Arc::new(AtomicU64::new(0)));
    for (name, handle) in registry.names() {
        println!("  {:<16} {}", name, handle);
    }
    Ok(())
}

fn cmd_register(config: &Config, client: i64) -> Result<()> {
    debug!(client, "cmd_register: called");
    let store = Arc::new(open_store(config)?);
    let registry = demo_registry(Arc::new(AtomicU64::new(0)));
    let coordinator = HeadlessCoordinator::builder(store, registry)
        .config(config.coordinator.clone())
        .build();

    let handle = EntryPointRegistry::handle_for(DEMO_ENTRY_POINT);
    let outcome = coordinator.register_handles(handle, client)?;
    println!("{:?}: registration={} client={}", outcome, handle, client);
    Ok(())
}

async fn cmd_simulate(
    config: &Config,
    producers: usize,
    events: usize,
    ephemeral: bool,
    timeout: Duration,
) -> Result<()> {
    debug!(producers, events, ephemeral, "cmd_simulate: called");
    let store: Arc<dyn HandleStore> = if ephemeral {
        Arc::new(MemoryHandleStore::new(config.store.namespace.clone()))
    } else {
        Arc::new(open_store(config)?)
    };

    let printed = Arc::new(AtomicU64::new(0));
    let engine = Arc::new(InMemoryEngine::new());
    let coordinator = HeadlessCoordinator::builder(Arc::clone(&store), demo_registry(Arc::clone(&printed)))
        .config(config.coordinator.clone())
        .engine(engine.clone())
        .build();

    if ephemeral {
        coordinator.register_handles(EntryPointRegistry::handle_for(DEMO_ENTRY_POINT), 1i64)?;
    } else if store.get()?.is_none() {
        warn!("no headless task registered, events will be dropped");
        eprintln!("No headless task registered; run `hd register` first. Events will be dropped.");
    }
    engine.set_headless_receiver(Arc::new(coordinator.clone()));

    let started = Instant::now();
    let threads: Vec<_> = (0..producers)
        .map(|p| {
            let engine = Arc::clone(&engine);
            thread::Builder::new()
                .name(format!("producer-{p}"))
                .spawn(move || {
                    for seq in 0..events {
                        engine.emit(demo_event(p, seq));
                    }
                })
                .context("Failed to spawn producer thread")
        })
        .collect::<Result<_>>()?;
    for handle in threads {
        handle.join().map_err(|_| eyre!("producer thread panicked"))?;
    }

    let deadline = started + timeout;
    loop {
        let metrics = coordinator.metrics();
        let expected = metrics
            .events_received
            .saturating_sub(metrics.events_dropped + metrics.send_failures);
        if printed.load(Ordering::SeqCst) >= expected {
            break;
        }
        if Instant::now() >= deadline {
            engine.clear_headless_receiver();
            return Err(eyre!(
                "timed out after {:?}: printed {} of {} events (state {})",
                timeout,
                printed.load(Ordering::SeqCst),
                expected,
                coordinator.state()
            ));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    engine.clear_headless_receiver();

    let metrics = coordinator.metrics();
    info!(?metrics, elapsed = ?started.elapsed(), "simulation finished");
    eprintln!("state: {}", coordinator.state());
    eprint!("{}", serde_yaml::to_string(&metrics)?);
    Ok(())
}
