//! Server orchestrator: storage, listener and shutdown.

use filestream_config::Config;
use filestream_file_ops::ensure_storage_dir;
use filestream_transport::RpcServer;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::service::FileService;

/// Runs the file service until SIGINT.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let listener = RpcServer::<FileService>::bind(config.addr()).await?;

    tokio::select! {
        result = serve(&config, listener, cancel.clone()) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
            cancel.cancel();
        }
    }
    Ok(())
}

/// Serves on an already bound listener until `cancel` fires.
pub async fn serve(
    config: &Config,
    listener: TcpListener,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let storage = config.storage_dir();
    ensure_storage_dir(&storage).await?;

    let transfer = config.transfer_config();
    tracing::info!(
        storage = %storage.display(),
        chunk_size = transfer.chunk_size,
        chunk_delay = ?transfer.chunk_delay,
        "server is running"
    );

    let service = FileService::new(storage, transfer, cancel.clone());
    RpcServer::new(service, cancel).run(listener).await?;
    Ok(())
}
