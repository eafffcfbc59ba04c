//! Upload without progress: chunks out, one summary back.

use filestream_protocol::{UploadChunk, UploadSummary};
use filestream_transport::{MessageSink, MessageSource};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::sender::send_chunks;
use crate::{TransferConfig, TransferError};

/// Sends `source`, then waits for the server's single summary.
///
/// The summary must match the bytes sent and must be followed by
/// end-of-stream.
pub async fn upload<R, W, S>(
    source: R,
    sink: &mut W,
    stream: &mut S,
    config: &TransferConfig,
    cancel: &CancellationToken,
) -> Result<UploadSummary, TransferError>
where
    R: AsyncRead + Unpin,
    W: MessageSink<UploadChunk> + ?Sized,
    S: MessageSource<UploadSummary> + ?Sized,
{
    let sent = send_chunks::<_, _, UploadChunk>(source, sink, config, cancel).await?;

    let summary = stream
        .recv()
        .await?
        .ok_or_else(|| TransferError::ProtocolViolation("upload: missing summary".into()))?;
    if stream.recv().await?.is_some() {
        return Err(TransferError::ProtocolViolation(
            "upload: more than one summary".into(),
        ));
    }
    if summary.size != sent.bytes {
        return Err(TransferError::ProtocolViolation(format!(
            "upload: server stored {} bytes, sent {}",
            summary.size, sent.bytes
        )));
    }

    info!(size = summary.size, chunks = sent.chunks, "upload complete");
    Ok(summary)
}
