//! One-way transfer from server to client.

use filestream_protocol::DownloadChunk;
use filestream_transport::{MessageSink, MessageSource};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::sender::{SendSummary, send_chunks};
use crate::{TransferConfig, TransferError};

/// Streams `source` to the client as download chunks.
///
/// Same chunking and pacing as an upload.
pub async fn serve_download<R, S>(
    source: R,
    sink: &mut S,
    config: &TransferConfig,
    cancel: &CancellationToken,
) -> Result<SendSummary, TransferError>
where
    R: AsyncRead + Unpin,
    S: MessageSink<DownloadChunk> + ?Sized,
{
    let summary = send_chunks::<_, _, DownloadChunk>(source, sink, config, cancel).await?;
    info!(bytes = summary.bytes, chunks = summary.chunks, "download served");
    Ok(summary)
}

/// Writes every received chunk to `out` until the server ends the stream.
///
/// Returns the number of bytes written.
pub async fn download<S, W>(
    source: &mut S,
    out: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, TransferError>
where
    S: MessageSource<DownloadChunk> + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut total = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            next = source.recv() => next?,
        };
        let Some(chunk) = next else {
            break;
        };
        out.write_all(&chunk.data).await?;
        total += chunk.data.len() as u64;
        debug!(len = chunk.data.len(), total_bytes = total, "download chunk");
    }
    out.flush().await?;
    info!(total_bytes = total, "download complete");
    Ok(total)
}
