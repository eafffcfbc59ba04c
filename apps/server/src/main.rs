//! filestream server entry point.

mod app;
mod service;

use std::path::PathBuf;

use clap::Parser;
use filestream_config::Config;
use tracing_subscriber::EnvFilter;

/// filestream server - chunked file transfer over framed TCP calls.
#[derive(Debug, Parser)]
#[command(name = "filestream-server", version)]
struct Cli {
    /// TOML configuration file (defaults to $FILESTREAM_CONFIG, then ./filestream.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding the configuration
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overriding the configuration (0 = auto-assign)
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting filestream server"
    );

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(cli.host, cli.port, None)?;
    tracing::info!(addr = %config.addr(), debug = config.debug, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}
