//! MIDI DMX Bridge
//!
//! Binds MIDI controller input to DMX channels, with MIDI learn and an operator console.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use midi_dmx_bridge::config::AppConfig;
use midi_dmx_bridge::decoder::{InputBackend, MidiDecoder, MidirBackend};
use midi_dmx_bridge::dmx::DmxUniverse;
use midi_dmx_bridge::engine::{Engine, EngineOptions, Notifier};
use midi_dmx_bridge::mapping::MappingStore;
use midi_dmx_bridge::paths::AppPaths;
use midi_dmx_bridge::Error;

/// MIDI DMX Bridge - drive DMX channels from MIDI controllers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the detected app directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// JSON file holding the MIDI mappings
    #[arg(short, long)]
    mappings: Option<PathBuf>,

    /// MIDI input to attach (name or substring, repeatable)
    #[arg(short, long)]
    input: Vec<String>,

    /// MIDI learn timeout in milliseconds
    #[arg(long)]
    learn_timeout_ms: Option<u64>,

    /// List available MIDI inputs and exit
    #[arg(long)]
    list_ports: bool,

    /// Run without the interactive console
    #[arg(long)]
    headless: bool,

    /// Print every MIDI message and DMX write
    #[arg(long)]
    monitor: bool,

    /// Start with no mappings if the mapping file cannot be parsed
    #[arg(long)]
    ignore_corrupt_mappings: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut paths = AppPaths::detect();
    if let Some(config) = &args.config {
        paths.config = config.clone();
    }

    let mut config = AppConfig::load(&paths.config).await?;
    if let Some(timeout_ms) = args.learn_timeout_ms {
        config.learn.timeout_ms = timeout_ms;
    }
    config.validate()?;

    paths.ensure_directories()?;
    let log_dir = config
        .logging
        .dir
        .clone()
        .unwrap_or_else(|| paths.logs_dir.clone());
    let _log_guard = init_logging(&args.log_level, Some(&log_dir))?;

    info!("Starting MIDI DMX Bridge v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());

    if args.list_ports {
        let ports = MidirBackend::new(&config.midi.client_name).port_names()?;
        cli::print_ports(&ports);
        return Ok(());
    }

    let mappings_path = args
        .mappings
        .clone()
        .or_else(|| config.mappings_file(&paths.base_dir()))
        .unwrap_or_else(|| paths.mappings_file());
    info!("Mappings file: {}", mappings_path.display());

    let notifier = Notifier::default();
    let notifications = notifier.subscribe();

    let store = open_store(&mappings_path, &config, &notifier, args.ignore_corrupt_mappings).await?;
    info!("Loaded {} MIDI mappings", store.len());

    let universe = DmxUniverse::new();
    let engine = Engine::spawn(
        store,
        Arc::new(universe.clone()),
        notifier,
        EngineOptions {
            learn_timeout: config.learn_timeout(),
        },
    );

    let dispatch = engine.clone();
    let mut decoder = MidiDecoder::with_midir(
        &config.midi.client_name,
        Arc::new(move |event| dispatch.dispatch_midi(event)),
    );
    for input in config.midi.inputs.iter().chain(args.input.iter()) {
        if let Err(e) = decoder.attach(input) {
            warn!("{}", e);
        }
    }

    let console = cli::Console::new(engine.clone(), decoder, universe);
    let lines = if args.headless {
        None
    } else {
        println!("Type 'help' for commands.");
        Some(cli::spawn_reader()?)
    };

    run_app(console, lines, notifications, args.monitor, shutdown_signal()).await;

    info!("Shutting down...");
    if let Err(e) = engine.shutdown().await {
        error!("Final mapping write failed: {}", e);
    }
    info!("MIDI DMX Bridge shutdown complete");
    Ok(())
}

async fn open_store(
    path: &Path,
    config: &AppConfig,
    notifier: &Notifier,
    ignore_corrupt: bool,
) -> Result<MappingStore> {
    let debounce_ms = config.persistence.debounce_ms;
    let on_failure = Some(notifier.persistence_callback());

    match MappingStore::open(path, debounce_ms, on_failure.clone()).await {
        Ok(store) => Ok(store),
        Err(e @ Error::ConfigCorrupt { .. }) if ignore_corrupt => {
            warn!("{}; starting with no mappings", e);
            Ok(MappingStore::open_empty(path, debounce_ms, on_failure))
        }
        Err(e) => Err(e).context("Failed to load MIDI mappings (use --ignore-corrupt-mappings to start empty)"),
    }
}

async fn run_app(
    mut console: cli::Console,
    mut lines: Option<mpsc::UnboundedReceiver<String>>,
    mut notifications: broadcast::Receiver<midi_dmx_bridge::engine::Notification>,
    monitor: bool,
    shutdown: impl std::future::Future<Output = ()>,
) {
    info!("Ready to process MIDI events!");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = next_line(&mut lines) => {
                match line {
                    Some(line) => {
                        if !console.handle_line(&line).await {
                            break;
                        }
                    }
                    // Console closed (Ctrl-D)
                    None => break,
                }
            }
            notification = notifications.recv() => {
                match notification {
                    Ok(notification) => cli::print_notification(&notification, monitor),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Console missed {} notifications", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    console.decoder_mut().detach_all();
}

async fn next_line(lines: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match lines {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Console and rolling file logging. The returned guard must live until exit.
fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "midi-dmx-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
