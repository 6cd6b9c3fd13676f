//! # relay
//!
//! Relay server binary. Loads settings, installs logging and metrics, and
//! serves the text, targeted and image relay endpoints until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::logging;
use relay_server::{RelayServer, ServerConfig};
use relay_settings::RelaySettings;

/// Real-time text and image relay server.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Real-time text and image relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `relay_server=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(relay_settings::settings_path)
    }

    /// Apply command-line overrides on top of file and environment values.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }

    fn log_filter(&self, settings: &RelaySettings) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| settings.logging.level.as_filter_str().to_owned())
    }
}

fn load(cli: &Cli) -> Result<RelaySettings> {
    let path = cli.settings_path();
    let mut settings = relay_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load(&args)?;

    logging::init_subscriber(&args.log_filter(&settings), settings.logging.format);

    let metrics = relay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = RelayServer::new(ServerConfig::from(&settings), metrics);
    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!("relay listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.shutdown().graceful_shutdown(vec![handle], None).await {
        tracing::warn!("server did not stop in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
