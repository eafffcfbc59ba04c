//! The two directions of a call stream.
//!
//! [`FrameWriter`] owns the outbound direction and [`FrameReader`] the
//! inbound one. They are independent values, so one task can send while
//! another receives on the same call without any locking.
//!
//! Message typing is deferred to each send/receive, so the same writer
//! serves any message type. Code that is generic over the transport uses
//! the [`MessageSink`] / [`MessageSource`] traits instead of the concrete
//! types.

use std::future::Future;
use std::pin::Pin;

use filestream_protocol::Status;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::wire::{FrameKind, read_frame, write_frame, write_json_frame};

/// A boxed future returned by transport trait methods.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Send direction of a stream carrying messages of type `M`.
pub trait MessageSink<M>: Send {
    /// Sends one message.
    fn send(&mut self, msg: M) -> TransportFuture<'_, ()>;

    /// Signals that no further messages will be sent in this direction.
    fn half_close(&mut self) -> TransportFuture<'_, ()>;
}

/// Receive direction of a stream carrying messages of type `M`.
pub trait MessageSource<M>: Send {
    /// Receives the next message.
    ///
    /// Returns `None` once the peer has ended its direction cleanly.
    fn recv(&mut self) -> TransportFuture<'_, Option<M>>;
}

impl<M, S: MessageSink<M> + ?Sized> MessageSink<M> for &mut S {
    fn send(&mut self, msg: M) -> TransportFuture<'_, ()> {
        (**self).send(msg)
    }

    fn half_close(&mut self) -> TransportFuture<'_, ()> {
        (**self).half_close()
    }
}

impl<M, S: MessageSource<M> + ?Sized> MessageSource<M> for &mut S {
    fn recv(&mut self) -> TransportFuture<'_, Option<M>> {
        (**self).recv()
    }
}

// ---------------------------------------------------------------------------
// FrameWriter
// ---------------------------------------------------------------------------

/// Outbound direction of a call.
pub struct FrameWriter<W> {
    writer: W,
    closed: bool,
    sent: u64,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
            sent: 0,
        }
    }

    /// Sends one message.
    pub async fn send_message<T: Serialize>(&mut self, msg: &T) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(msg)?;
        self.send_payload(payload).await
    }

    async fn send_payload(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        write_frame(&mut self.writer, FrameKind::Message, &payload).await?;
        self.sent += 1;
        trace!(seq = self.sent, len = payload.len(), "frame sent");
        Ok(())
    }

    /// Ends this direction with an END frame and shuts down the writer.
    ///
    /// Calling it again after the direction is closed is a no-op.
    pub async fn finish(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        write_frame(&mut self.writer, FrameKind::End, &[]).await?;
        self.shutdown().await;
        debug!(messages = self.sent, "stream half-closed");
        Ok(())
    }

    /// Ends this direction with a terminal STATUS frame.
    pub async fn fail(&mut self, status: &Status) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.closed = true;
        write_json_frame(&mut self.writer, FrameKind::Status, status).await?;
        self.shutdown().await;
        debug!(code = %status.code, "stream closed with status");
        Ok(())
    }

    async fn shutdown(&mut self) {
        // The END/STATUS frame is already flushed; a peer that hung up
        // in the meantime makes shutdown fail harmlessly.
        if let Err(e) = self.writer.shutdown().await {
            debug!("shutdown after close failed: {e}");
        }
    }

    /// Returns `true` once END or STATUS has been written.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of messages sent so far.
    pub fn messages_sent(&self) -> u64 {
        self.sent
    }
}

impl<W, M> MessageSink<M> for FrameWriter<W>
where
    W: AsyncWrite + Unpin + Send,
    M: Serialize,
{
    fn send(&mut self, msg: M) -> TransportFuture<'_, ()> {
        let payload = serde_json::to_vec(&msg);
        Box::pin(async move { self.send_payload(payload?).await })
    }

    fn half_close(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(self.finish())
    }
}

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// Inbound direction of a call.
pub struct FrameReader<R> {
    reader: R,
    finished: bool,
    received: u64,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
            received: 0,
        }
    }

    /// Receives the next message.
    ///
    /// - `Ok(None)`: the peer ended its direction (END frame, then EOF).
    /// - `Err(Status)`: the peer ended its direction with an error.
    /// - `Err(ConnectionLost)`: EOF before any END frame.
    /// - `Err(Protocol)`: a message or second END after end-of-stream.
    pub async fn next_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let Some(frame) = read_frame(&mut self.reader).await? else {
            return if self.finished {
                Ok(None)
            } else {
                Err(TransportError::ConnectionLost)
            };
        };

        match frame.kind {
            FrameKind::Message => {
                if self.finished {
                    return Err(TransportError::Protocol(
                        "message received after end-of-stream".into(),
                    ));
                }
                let msg = frame.decode()?;
                self.received += 1;
                trace!(seq = self.received, "frame received");
                Ok(Some(msg))
            }
            FrameKind::End => {
                if self.finished {
                    return Err(TransportError::Protocol(
                        "end-of-stream received twice".into(),
                    ));
                }
                self.finished = true;
                debug!(messages = self.received, "peer half-closed");
                Ok(None)
            }
            FrameKind::Status => {
                if self.finished {
                    return Err(TransportError::Protocol(
                        "status received after end-of-stream".into(),
                    ));
                }
                self.finished = true;
                let status: Status = frame.decode()?;
                Err(TransportError::Status(status))
            }
            FrameKind::Call => Err(TransportError::Protocol(
                "unexpected call frame inside a stream".into(),
            )),
        }
    }

    /// Returns `true` once the peer's END or STATUS has been observed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of messages received so far.
    pub fn messages_received(&self) -> u64 {
        self.received
    }
}

impl<R, M> MessageSource<M> for FrameReader<R>
where
    R: AsyncRead + Unpin + Send,
    M: DeserializeOwned + Send + 'static,
{
    fn recv(&mut self) -> TransportFuture<'_, Option<M>> {
        Box::pin(self.next_message())
    }
}
