//! SandeshIO - rover telemetry daemon
//!
//! Steps the simulated rover at a fixed rate, streams its telemetry to an
//! MQTT broker under `sim/<instance>/out/...` and applies control commands
//! received on `sim/<instance>/in/control`.

use clap::Parser;
use sandesh_io::app::SandeshApp;
use sandesh_io::config::Config;
use sandesh_io::error::{Error, Result};
use sandesh_io::transport::MqttTransport;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

const DEFAULT_CONFIG_PATH: &str = "/etc/sandesh.toml";

#[derive(Parser, Debug)]
#[command(name = "sandesh-io")]
#[command(about = "Rover telemetry daemon publishing to an MQTT broker")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the broker instance id
    #[arg(short, long)]
    instance_id: Option<u32>,

    /// Stop after this many ticks
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Do not connect at start-up
    #[arg(long)]
    offline: bool,
}

/// Load the config; a missing default file means built-in defaults
fn load_config(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG_PATH) && !path.exists() {
        return Ok(Config::default());
    }
    Config::load(path)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(id) = args.instance_id {
        config.broker.instance_id = id;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level))
        .init();

    log::info!("SandeshIO v{} starting...", env!("CARGO_PKG_VERSION"));
    if args.config.exists() {
        log::info!("Using config: {}", args.config.display());
    } else {
        log::info!("No config at {}, using defaults", args.config.display());
    }
    log::info!(
        "Instance {} | send {:?}/{:?} | receive {:?}/{:?}",
        config.broker.instance_id,
        config.encoding.send_format,
        config.encoding.send_compression,
        config.encoding.receive_format,
        config.encoding.receive_compression
    );

    let transport = MqttTransport::new(config.pipeline.inbound_queue_capacity);
    let auto_connect = config.broker.auto_connect && !args.offline;
    let mut app = SandeshApp::new(config, Box::new(transport));

    let shutdown = app.shutdown_flag();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        shutdown.store(true, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    if auto_connect {
        // Telemetry stays offline on failure; the simulation still runs
        if let Err(e) = app.connect() {
            log::warn!("Starting offline: {}", e);
        }
    } else {
        log::info!("Starting offline");
    }

    log::info!("SandeshIO running. Press Ctrl-C to stop.");
    app.run(args.ticks);
    app.shutdown();

    log::info!("SandeshIO stopped");
    Ok(())
}
