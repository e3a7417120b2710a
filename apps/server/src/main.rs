//! Classroom Server - standalone ingestion, compositing, and recording
//! server for the classroom streaming platform.
//!
//! This binary hosts the HTTP recording API and the room hub WebSocket as a
//! background daemon, with no embedding application required.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use classroom_core::{bootstrap_services, start_server, AppState};
use clap::Parser;

use crate::config::ServerConfig;

/// Classroom Server - headless media ingestion, compositing, and recording.
#[derive(Parser, Debug)]
#[command(name = "classroom-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CLASSROOM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind address (overrides config file).
    #[arg(short = 'b', long, env = "CLASSROOM_BIND_ADDR")]
    bind_addr: Option<std::net::SocketAddr>,

    /// Recordings directory (overrides config file).
    #[arg(short = 'd', long, env = "CLASSROOM_RECORDINGS_DIR")]
    recordings_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Classroom Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(recordings_dir) = args.recordings_dir {
        config.recordings_dir = recordings_dir;
    }

    log::info!(
        "Configuration: bind_addr={}, recordings_dir={}, max_concurrent_sessions={}",
        config.bind_addr,
        config.recordings_dir,
        config.max_concurrent_sessions
    );

    let core_config = config.to_core_config();
    let services =
        std::sync::Arc::new(bootstrap_services(&core_config).context("Failed to bootstrap services")?);

    log::info!("Services bootstrapped successfully");

    let app_state = AppState::new(services);
    let bind_addr = config.bind_addr;

    log::info!("HTTP server listening on {}", bind_addr);

    // `start_server` installs its own Ctrl+C/SIGTERM handling and runs
    // `BootstrappedServices::shutdown` before returning, so running it on
    // the main task is sufficient - no separate signal wait is needed here.
    start_server(app_state, bind_addr)
        .await
        .context("Server error")?;

    log::info!("Shutdown complete");
    Ok(())
}
