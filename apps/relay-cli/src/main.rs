//! mediarelay command line entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Relays local files and URLs through the chunked uploader into a local outbox.
#[derive(Debug, Parser)]
#[command(name = "mediarelay", version)]
struct Cli {
    /// Configuration file (defaults to ~/.config/mediarelay/relay.toml).
    #[arg(long, env = "MEDIARELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured outbox directory.
    #[arg(long)]
    outbox: Option<PathBuf>,

    /// Overrides the configured recipient.
    #[arg(long)]
    recipient: Option<String>,

    /// Local paths or http(s) URLs to relay.
    #[arg(required = true)]
    inputs: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting mediarelay");

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(outbox) = cli.outbox {
        config.outbox_dir = outbox;
    }
    if let Some(recipient) = cli.recipient {
        config.recipient = recipient;
    }
    tracing::info!(
        outbox = %config.outbox_dir.display(),
        recipient = %config.recipient,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, cli.inputs))?;

    Ok(())
}
