//! Inbound half of a progress upload: the server's acknowledgements.

use filestream_protocol::ProgressAck;
use filestream_transport::MessageSource;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::TransferError;

/// What the receiver observed before end-of-stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSummary {
    pub acks: u64,
    /// Total reported by the last ack (0 if none arrived).
    pub last_total: u64,
}

/// Consumes progress acks until the server ends its direction.
///
/// Each ack is handed to `observer` in receipt order. Totals must never
/// decrease. Ending is decided by the server's end-of-stream alone, never
/// by our own half-close.
pub async fn receive_progress<S, F>(
    source: &mut S,
    mut observer: F,
    cancel: &CancellationToken,
) -> Result<ProgressSummary, TransferError>
where
    S: MessageSource<ProgressAck> + ?Sized,
    F: FnMut(&ProgressAck),
{
    let mut summary = ProgressSummary::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            next = source.recv() => next?,
        };
        let Some(ack) = next else {
            break;
        };

        if ack.total_bytes < summary.last_total {
            return Err(TransferError::ProtocolViolation(format!(
                "progress went backwards: {} after {}",
                ack.total_bytes, summary.last_total
            )));
        }
        summary.acks += 1;
        summary.last_total = ack.total_bytes;
        debug!(total_bytes = ack.total_bytes, message = %ack.message, "progress");
        observer(&ack);
    }

    debug!(acks = summary.acks, total_bytes = summary.last_total, "server ended progress stream");
    Ok(summary)
}
