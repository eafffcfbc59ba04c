//! Client subcommands.

use std::path::Path;

use anyhow::Context;
use filestream_protocol::{DownloadRequest, ListFilesRequest, ListFilesResponse, Method};
use filestream_transfer::{TransferConfig, TransferCoordinator, TransferOutcome};
use filestream_transport::Channel;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Prints the server's storage listing.
pub async fn list(channel: &Channel) -> anyhow::Result<Vec<String>> {
    let resp: ListFilesResponse = channel
        .unary(Method::ListFiles, &ListFilesRequest {})
        .await
        .context("ListFiles failed")?;
    for name in &resp.filenames {
        println!("{name}");
    }
    Ok(resp.filenames)
}

/// Downloads `filename` to `output`, or to stdout when no output is given.
pub async fn download(
    channel: &Channel,
    filename: &str,
    output: Option<&Path>,
    cancel: &CancellationToken,
) -> anyhow::Result<u64> {
    let (mut sink, mut stream) = channel.open(Method::Download).await?;
    sink.send_message(&DownloadRequest {
        filename: filename.to_string(),
    })
    .await?;
    sink.finish().await?;

    let total = match output {
        Some(path) => {
            let mut file = File::create(path)
                .await
                .with_context(|| format!("cannot create {}", path.display()))?;
            filestream_transfer::download(&mut stream, &mut file, cancel).await?
        }
        None => {
            let mut stdout = tokio::io::stdout();
            let total = filestream_transfer::download(&mut stream, &mut stdout, cancel).await?;
            stdout.flush().await?;
            total
        }
    };
    tracing::info!(filename, total_bytes = total, "download finished");
    Ok(total)
}

/// Uploads `path` and prints the size the server stored.
pub async fn upload(
    channel: &Channel,
    path: &Path,
    transfer: &TransferConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<u64> {
    let file = open_source(path).await?;
    let (mut sink, mut stream) = channel.open(Method::Upload).await?;
    let summary =
        filestream_transfer::upload(file, &mut sink, &mut stream, transfer, cancel).await?;
    println!("received data size: {}", summary.size);
    Ok(summary.size)
}

/// Uploads `path`, printing every progress message as it arrives.
pub async fn upload_progress(
    channel: &Channel,
    path: &Path,
    transfer: &TransferConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<TransferOutcome> {
    let file = open_source(path).await?;
    let outcome = TransferCoordinator::new(transfer.clone())
        .with_cancel(cancel.clone())
        .upload(channel, file, |ack| println!("received message: {}", ack.message))
        .await?;
    Ok(outcome)
}

/// Opens the upload source before any connection is made.
async fn open_source(path: &Path) -> anyhow::Result<File> {
    File::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))
}
