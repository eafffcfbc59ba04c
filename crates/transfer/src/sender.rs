//! Outbound half of a transfer: source bytes to chunk messages.

use filestream_transport::MessageSink;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::chunk::{Chunk, ChunkReader};
use crate::{TransferConfig, TransferError};

/// What the sender pushed before half-closing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendSummary {
    pub chunks: u64,
    pub bytes: u64,
}

/// Streams `source` into `sink` as chunk messages, then half-closes.
///
/// The direction is half-closed exactly once, and only after the source is
/// exhausted. On error nothing is half-closed: the caller drops the sink
/// and the peer sees a severed stream rather than a short upload.
///
/// `cancel` is observed between chunks, while a send is pending and during
/// the pacing delay.
pub async fn send_chunks<R, S, M>(
    source: R,
    sink: &mut S,
    config: &TransferConfig,
    cancel: &CancellationToken,
) -> Result<SendSummary, TransferError>
where
    R: AsyncRead + Unpin,
    S: MessageSink<M> + ?Sized,
    M: From<Chunk>,
{
    let mut reader = ChunkReader::new(source, config.effective_chunk_size());
    let mut summary = SendSummary::default();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            chunk = reader.next_chunk() => chunk?,
        };
        let Some(chunk) = chunk else {
            break;
        };

        let offset = chunk.offset;
        let len = chunk.len() as u64;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            sent = sink.send(M::from(chunk)) => sent?,
        }
        summary.chunks += 1;
        summary.bytes += len;
        trace!(seq = summary.chunks, offset, len, "chunk sent");

        if let Some(delay) = config.chunk_delay {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    sink.half_close().await?;
    debug!(chunks = summary.chunks, bytes = summary.bytes, "source exhausted, stream half-closed");
    Ok(summary)
}
