//! filestream client entry point.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use filestream_config::Config;
use filestream_transport::Channel;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default upload source, relative to the storage directory.
const DEFAULT_UPLOAD_FILE: &str = "sports.txt";

/// filestream client - list, download and upload files.
#[derive(Debug, Parser)]
#[command(name = "filestream-client", version)]
struct Cli {
    /// TOML configuration file (defaults to $FILESTREAM_CONFIG, then ./filestream.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server host, overriding the configuration
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port, overriding the configuration
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Bytes per chunk, overriding the configuration
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the files in the server's storage directory
    List,

    /// Download a file from the server's storage directory
    Download {
        /// Name of the file on the server
        filename: String,

        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a file and print the stored size
    Upload {
        /// Local file to send
        file: Option<PathBuf>,
    },

    /// Upload a file, printing progress for every chunk (default)
    UploadProgress {
        /// Local file to send
        file: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(cli.host, cli.port, cli.chunk_size)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, cli.command))
}

async fn run(config: Config, command: Option<Command>) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("SIGINT received, cancelling");
                cancel.cancel();
            }
        });
    }

    let channel = Channel::new(config.addr()).with_cancel(cancel.clone());
    let transfer = config.transfer_config();
    let default_file = || config.storage_dir().join(DEFAULT_UPLOAD_FILE);

    match command.unwrap_or(Command::UploadProgress { file: None }) {
        Command::List => {
            commands::list(&channel).await?;
        }
        Command::Download { filename, output } => {
            commands::download(&channel, &filename, output.as_deref(), &cancel).await?;
        }
        Command::Upload { file } => {
            let path = file.unwrap_or_else(default_file);
            commands::upload(&channel, &path, &transfer, &cancel).await?;
        }
        Command::UploadProgress { file } => {
            let path = file.unwrap_or_else(default_file);
            let outcome = commands::upload_progress(&channel, &path, &transfer, &cancel).await?;
            tracing::info!(
                total_bytes = outcome.total_bytes,
                chunks = outcome.chunks_sent,
                "upload finished"
            );
        }
    }
    Ok(())
}
