//! Carlink receiver: entry point.
//!
//! Connects to a projection dongle through a TCP bridge, keeps the session
//! alive, writes the video and audio streams to the configured sinks, and
//! forwards keys and touches typed on the console.
//!
//! # Usage
//!
//! ```text
//! carlink-receiver [OPTIONS]
//!
//! Options:
//!   --config <PATH>       TOML configuration file [default: carlink.toml]
//!   --address <ADDR>      Dongle bridge address, overrides [link] address
//!   --log-level <LEVEL>   Log filter, overrides [receiver] log_level
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable           | Overrides     |
//! |--------------------|---------------|
//! | `CARLINK_CONFIG`   | `--config`    |
//! | `CARLINK_ADDRESS`  | `--address`   |
//! | `CARLINK_LOG`      | `--log-level` |
//! | `RUST_LOG`         | everything above for the log filter |
//!
//! # Architecture overview
//!
//! ```text
//! dongle ⇄ TcpLink ⇄ SessionSupervisor ─► MessageRouter ─► video / audio files
//!                          ▲
//!          HeartbeatMonitor, KeyForwarder, TouchForwarder ◄─ console (stdin)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use carlink_receiver::application::key_forwarder::key_channel;
use carlink_receiver::application::supervisor::SessionSupervisor;
use carlink_receiver::application::touch_forwarder::touch_channel;
use carlink_receiver::infrastructure::input::console::spawn_console;
use carlink_receiver::infrastructure::link::tcp::TcpLinkConnector;
use carlink_receiver::infrastructure::sinks::file::FileSinkFactory;
use carlink_receiver::infrastructure::storage::config::{
    load_config_from, ReceiverConfig, DEFAULT_CONFIG_FILE,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Head-unit receiver for projection dongles.
#[derive(Debug, Parser)]
#[command(
    name = "carlink-receiver",
    about = "Head-unit receiver for projection dongles",
    version
)]
struct Cli {
    /// TOML configuration file.  A missing file means all defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, env = "CARLINK_CONFIG")]
    config: PathBuf,

    /// `host:port` of the dongle bridge.
    #[arg(long, env = "CARLINK_ADDRESS")]
    address: Option<String>,

    /// Log filter used when `RUST_LOG` is unset (e.g. `debug`,
    /// `carlink_receiver=trace`).
    #[arg(long, env = "CARLINK_LOG")]
    log_level: Option<String>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply(&self, mut config: ReceiverConfig) -> ReceiverConfig {
        if let Some(address) = &self.address {
            config.link.address = address.clone();
        }
        if let Some(level) = &self.log_level {
            config.receiver.log_level = level.clone();
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config_from(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let config = cli.apply(config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.receiver.log_level)),
        )
        .init();

    info!(
        address = %config.link.address,
        video = %config.sinks.video_path.display(),
        audio = %config.sinks.audio_path.display(),
        "carlink receiver starting"
    );

    // ── Wire adapters to the supervisor ───────────────────────────────────────
    let connector = Arc::new(
        TcpLinkConnector::new(config.link.address.clone())
            .with_connect_timeout(config.connect_timeout()),
    );
    let sinks = Arc::new(FileSinkFactory::new(
        &config.sinks.video_path,
        &config.sinks.audio_path,
    ));
    let supervisor = SessionSupervisor::new(
        connector,
        sinks,
        config.handshake_profile(),
        config.supervisor_config().context("invalid configuration")?,
    );

    let (key_ingress, keys) = key_channel();
    let (touch_ingress, touches) = touch_channel();
    spawn_console(key_ingress, touch_ingress).context("failed to start console input")?;

    let handle = supervisor.spawn_all(keys, touches);

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C; shutting down");

    if !handle.shutdown().await {
        warn!("some tasks did not stop in time");
    }
    info!("carlink receiver stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
