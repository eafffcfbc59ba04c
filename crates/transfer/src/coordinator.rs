//! Runs the two halves of a progress upload as independent tasks.
//!
//! The sender and the receiver share nothing but a cancellation token.
//! The receiver reports through a one-shot channel when the server's
//! direction has ended; only then is the sender joined.

use filestream_protocol::{Method, ProgressAck, UploadChunk};
use filestream_transport::{Channel, MessageSink, MessageSource};
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::receiver::{ProgressSummary, receive_progress};
use crate::sender::{SendSummary, send_chunks};
use crate::{TransferConfig, TransferError};

/// Result of a successful progress upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub total_bytes: u64,
    pub chunks_sent: u64,
    pub acks_received: u64,
}

/// Drives one upload with progress notifications.
#[derive(Debug, Clone)]
pub struct TransferCoordinator {
    config: TransferConfig,
    cancel: CancellationToken,
}

impl TransferCoordinator {
    pub fn new(config: TransferConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts the transfer when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Opens an `UploadAndNotifyProgress` call on `channel` and runs it.
    pub async fn upload<R, F>(
        &self,
        channel: &Channel,
        source: R,
        observer: F,
    ) -> Result<TransferOutcome, TransferError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        F: FnMut(&ProgressAck) + Send + 'static,
    {
        let (sink, stream) = channel.open(Method::UploadAndNotifyProgress).await?;
        self.run(source, sink, stream, observer).await
    }

    /// Runs a transfer over an already opened call.
    ///
    /// Returns only after the receiver has seen the server end its
    /// direction (or failed) and the sender task has finished.
    pub async fn run<R, W, S, F>(
        &self,
        source: R,
        sink: W,
        stream: S,
        observer: F,
    ) -> Result<TransferOutcome, TransferError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: MessageSink<UploadChunk> + 'static,
        S: MessageSource<ProgressAck> + 'static,
        F: FnMut(&ProgressAck) + Send + 'static,
    {
        // Child token: a failing task aborts its peer without touching
        // the caller's token.
        let cancel = self.cancel.child_token();

        let sender = {
            let config = self.config.clone();
            let cancel = cancel.clone();
            let mut sink = sink;
            tokio::spawn(async move {
                let result =
                    send_chunks::<_, _, UploadChunk>(source, &mut sink, &config, &cancel).await;
                if let Err(e) = &result {
                    if !e.is_cancelled() {
                        warn!("sender failed: {e}");
                    }
                    cancel.cancel();
                }
                result
            })
        };

        let (done_tx, done_rx) = oneshot::channel::<Result<ProgressSummary, TransferError>>();
        {
            let cancel = cancel.clone();
            let mut stream = stream;
            tokio::spawn(async move {
                let result = receive_progress(&mut stream, observer, &cancel).await;
                if let Err(e) = &result {
                    if !e.is_cancelled() {
                        warn!("receiver failed: {e}");
                    }
                    cancel.cancel();
                }
                let _ = done_tx.send(result);
            });
        }

        let received = done_rx
            .await
            .unwrap_or_else(|_| Err(TransferError::TaskFailed("receiver task ended early".into())));
        let sent = sender
            .await
            .unwrap_or_else(|e| Err(TransferError::TaskFailed(e.to_string())));

        let (sent, received) = resolve(sent, received)?;
        verify(&sent, &received)?;

        info!(
            total_bytes = sent.bytes,
            chunks = sent.chunks,
            acks = received.acks,
            "transfer complete"
        );
        Ok(TransferOutcome {
            total_bytes: sent.bytes,
            chunks_sent: sent.chunks,
            acks_received: received.acks,
        })
    }
}

/// Picks the error to report when either side failed.
///
/// A cancellation is only ever a consequence of something else, so the
/// other side's error wins. Between two genuine errors the sender's wins.
fn resolve(
    sent: Result<SendSummary, TransferError>,
    received: Result<ProgressSummary, TransferError>,
) -> Result<(SendSummary, ProgressSummary), TransferError> {
    match (sent, received) {
        (Ok(s), Ok(r)) => Ok((s, r)),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        (Err(s), Err(r)) => {
            if s.is_cancelled() && !r.is_cancelled() {
                Err(r)
            } else {
                Err(s)
            }
        }
    }
}

fn verify(sent: &SendSummary, received: &ProgressSummary) -> Result<(), TransferError> {
    if received.acks != sent.chunks {
        return Err(TransferError::ProtocolViolation(format!(
            "expected {} acks, got {}",
            sent.chunks, received.acks
        )));
    }
    if received.last_total != sent.bytes {
        return Err(TransferError::ProtocolViolation(format!(
            "server acknowledged {} bytes, sent {}",
            received.last_total, sent.bytes
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use filestream_transport::{TransportError, TransportFuture, start_call};

    use crate::testing::{MemoryService, spawn_service};

    async fn run_over_duplex(
        payload: &'static [u8],
        config: TransferConfig,
    ) -> (Result<TransferOutcome, TransferError>, Vec<u64>, Vec<u8>) {
        let service = Arc::new(MemoryService::default());
        let client = spawn_service(Arc::clone(&service));

        let (sink, stream) = start_call(client, Method::UploadAndNotifyProgress)
            .await
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer = {
            let seen = Arc::clone(&seen);
            move |ack: &ProgressAck| seen.lock().unwrap().push(ack.total_bytes)
        };

        let outcome = TransferCoordinator::new(config)
            .run(payload, sink, stream, observer)
            .await;
        let stored = service.stored.lock().unwrap().clone();
        let seen = seen.lock().unwrap().clone();
        (outcome, seen, stored)
    }

    #[tokio::test]
    async fn hello_world_in_five_byte_chunks() {
        let (outcome, seen, stored) =
            run_over_duplex(b"hello world!", TransferConfig::new(5)).await;

        assert_eq!(
            outcome.unwrap(),
            TransferOutcome {
                total_bytes: 12,
                chunks_sent: 3,
                acks_received: 3,
            }
        );
        assert_eq!(seen, vec![5, 10, 12]);
        assert_eq!(stored, b"hello world!");
    }

    #[tokio::test]
    async fn empty_source_completes_with_zero_total() {
        let (outcome, seen, stored) = run_over_duplex(b"", TransferConfig::new(5)).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.total_bytes, 0);
        assert_eq!(outcome.acks_received, 0);
        assert!(seen.is_empty());
        assert!(stored.is_empty());
    }

    type Timeline = Arc<Mutex<Vec<(&'static str, Duration)>>>;

    /// Sink that records when its direction was half-closed.
    struct TimedSink<W> {
        inner: W,
        start: tokio::time::Instant,
        timeline: Timeline,
    }

    impl<W: MessageSink<UploadChunk>> MessageSink<UploadChunk> for TimedSink<W> {
        fn send(&mut self, msg: UploadChunk) -> TransportFuture<'_, ()> {
            self.inner.send(msg)
        }

        fn half_close(&mut self) -> TransportFuture<'_, ()> {
            Box::pin(async move {
                self.inner.half_close().await?;
                let at = self.start.elapsed();
                self.timeline.lock().unwrap().push(("half_close", at));
                Ok(())
            })
        }
    }

    /// Source that records when the peer ended its direction.
    struct TimedSource<S> {
        inner: S,
        start: tokio::time::Instant,
        timeline: Timeline,
    }

    impl<S: MessageSource<ProgressAck>> MessageSource<ProgressAck> for TimedSource<S> {
        fn recv(&mut self) -> TransportFuture<'_, Option<ProgressAck>> {
            Box::pin(async move {
                let msg = self.inner.recv().await?;
                if msg.is_none() {
                    let at = self.start.elapsed();
                    self.timeline.lock().unwrap().push(("end_of_stream", at));
                }
                Ok(msg)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acks_arrive_while_upload_is_in_flight() {
        let service = Arc::new(MemoryService::default());
        let (sink, stream) = start_call(
            spawn_service(Arc::clone(&service)),
            Method::UploadAndNotifyProgress,
        )
        .await
        .unwrap();

        let start = tokio::time::Instant::now();
        let timeline = Timeline::default();
        let sink = TimedSink {
            inner: sink,
            start,
            timeline: Arc::clone(&timeline),
        };
        let stream = TimedSource {
            inner: stream,
            start,
            timeline: Arc::clone(&timeline),
        };
        let observer = {
            let timeline = Arc::clone(&timeline);
            move |_: &ProgressAck| timeline.lock().unwrap().push(("ack", start.elapsed()))
        };

        let outcome = TransferCoordinator::new(
            TransferConfig::new(5).with_chunk_delay(Duration::from_secs(1)),
        )
        .run(&b"hello world!"[..], sink, stream, observer)
        .await
        .unwrap();
        assert_eq!(outcome.acks_received, 3);
        assert_eq!(*service.stored.lock().unwrap(), b"hello world!");

        let timeline = timeline.lock().unwrap().clone();
        let at = |event: &str| -> Vec<Duration> {
            timeline
                .iter()
                .filter(|(e, _)| *e == event)
                .map(|(_, t)| *t)
                .collect()
        };
        let acks = at("ack");
        let half_close = at("half_close");
        let end_of_stream = at("end_of_stream");

        assert_eq!(acks.len(), 3);
        assert_eq!(half_close.len(), 1);
        assert_eq!(end_of_stream.len(), 1);
        // Each ack lands within the pacing delay that follows its chunk.
        for (i, ack) in acks.iter().enumerate() {
            assert!(*ack < Duration::from_secs(i as u64 + 1), "ack {i} at {ack:?}");
        }
        assert!(acks[0] < half_close[0]);
        assert!(end_of_stream[0] >= half_close[0]);
        assert_eq!(timeline.last().map(|(e, _)| *e), Some("end_of_stream"));
    }

    /// Sink that fails on a given send, counting half-closes.
    struct FailingSink {
        sends: usize,
        fail_on: usize,
    }

    impl MessageSink<UploadChunk> for FailingSink {
        fn send(&mut self, _msg: UploadChunk) -> TransportFuture<'_, ()> {
            Box::pin(async move {
                self.sends += 1;
                if self.sends == self.fail_on {
                    Err(TransportError::ConnectionLost)
                } else {
                    Ok(())
                }
            })
        }

        fn half_close(&mut self) -> TransportFuture<'_, ()> {
            // Never reached: a failed transfer is not half-closed.
            Box::pin(async { Err(TransportError::Closed) })
        }
    }

    /// Source that never yields, like a server waiting for more data.
    struct SilentSource;

    impl MessageSource<ProgressAck> for SilentSource {
        fn recv(&mut self) -> TransportFuture<'_, Option<ProgressAck>> {
            Box::pin(std::future::pending::<Result<Option<ProgressAck>, TransportError>>())
        }
    }

    #[tokio::test]
    async fn send_failure_on_second_chunk_does_not_hang() {
        let sink = FailingSink {
            sends: 0,
            fail_on: 2,
        };
        let result = TransferCoordinator::new(TransferConfig::new(5))
            .run(&b"hello world!"[..], sink, SilentSource, |_| {})
            .await;

        assert!(matches!(
            result,
            Err(TransferError::Transport(TransportError::ConnectionLost))
        ));
    }

    #[tokio::test]
    async fn unreadable_source_is_io_failure() {
        let source = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "missing",
            ))
            .build();
        let sink = FailingSink {
            sends: 0,
            fail_on: 1,
        };
        let result = TransferCoordinator::new(TransferConfig::default())
            .run(source, sink, SilentSource, |_| {})
            .await;

        assert!(matches!(result, Err(TransferError::Io(_))));
    }

    /// Source that acknowledges fewer bytes than were sent.
    struct ShortAcks {
        acks: Vec<ProgressAck>,
    }

    impl MessageSource<ProgressAck> for ShortAcks {
        fn recv(&mut self) -> TransportFuture<'_, Option<ProgressAck>> {
            let next = if self.acks.is_empty() {
                None
            } else {
                Some(self.acks.remove(0))
            };
            Box::pin(async move { Ok::<_, TransportError>(next) })
        }
    }

    struct NullSink;

    impl MessageSink<UploadChunk> for NullSink {
        fn send(&mut self, _msg: UploadChunk) -> TransportFuture<'_, ()> {
            Box::pin(async { Ok::<_, TransportError>(()) })
        }

        fn half_close(&mut self) -> TransportFuture<'_, ()> {
            Box::pin(async { Ok::<_, TransportError>(()) })
        }
    }

    #[tokio::test]
    async fn short_acknowledgement_is_protocol_violation() {
        let stream = ShortAcks {
            acks: vec![ProgressAck::received(5), ProgressAck::received(10)],
        };
        let result = TransferCoordinator::new(TransferConfig::new(5))
            .run(&b"hello world!"[..], NullSink, stream, |_| {})
            .await;

        assert!(matches!(result, Err(TransferError::ProtocolViolation(_))));
    }

    #[tokio::test]
    async fn caller_cancel_yields_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = TransferCoordinator::new(TransferConfig::default())
            .with_cancel(cancel)
            .run(&b"hello"[..], NullSink, SilentSource, |_| {})
            .await;

        assert!(matches!(result, Err(TransferError::Cancelled)));
    }

    #[test]
    fn genuine_error_beats_cancellation() {
        let r = resolve(
            Err(TransferError::Cancelled),
            Err(TransferError::ProtocolViolation("x".into())),
        );
        assert!(matches!(r, Err(TransferError::ProtocolViolation(_))));

        let r = resolve(
            Err(TransferError::Io(std::io::Error::other("disk"))),
            Err(TransferError::Cancelled),
        );
        assert!(matches!(r, Err(TransferError::Io(_))));
    }

    #[test]
    fn sender_error_wins_between_genuine_errors() {
        let r = resolve(
            Err(TransferError::Io(std::io::Error::other("disk"))),
            Err(TransferError::ProtocolViolation("x".into())),
        );
        assert!(matches!(r, Err(TransferError::Io(_))));
    }
}
