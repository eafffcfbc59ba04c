//! Client side: opens calls on the file service.
//!
//! Each call gets its own TCP connection; the CALL frame is written
//! before the two directions are handed back to the caller.

use filestream_protocol::{CallHeader, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::stream::{FrameReader, FrameWriter};
use crate::wire::{FrameKind, write_json_frame};
use crate::{TCP_BUFFER_SIZE, TCP_CONNECT_TIMEOUT};

/// The two directions of a call opened over TCP.
pub type TcpCall = (FrameWriter<OwnedWriteHalf>, FrameReader<BufReader<OwnedReadHalf>>);

/// Starts a call on already-split connection halves.
pub async fn start_call_split<R, W>(
    reader: R,
    mut writer: W,
    method: Method,
) -> Result<(FrameWriter<W>, FrameReader<R>), TransportError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    write_json_frame(&mut writer, FrameKind::Call, &CallHeader::new(method)).await?;
    debug!(%method, "call started");
    Ok((FrameWriter::new(writer), FrameReader::new(reader)))
}

/// Starts a call on any duplex connection.
pub async fn start_call<IO>(
    io: IO,
    method: Method,
) -> Result<(FrameWriter<WriteHalf<IO>>, FrameReader<ReadHalf<IO>>), TransportError>
where
    IO: AsyncRead + AsyncWrite + Send,
{
    let (reader, writer) = tokio::io::split(io);
    start_call_split(reader, writer, method).await
}

/// Connection settings for the file service.
#[derive(Debug, Clone)]
pub struct Channel {
    addr: String,
    connect_timeout: std::time::Duration,
    cancel: CancellationToken,
}

impl Channel {
    /// Creates a channel for `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: TCP_CONNECT_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Aborts pending connection attempts when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connects and starts a call for `method`.
    pub async fn open(&self, method: Method) -> Result<TcpCall, TransportError> {
        // Connect with timeout + cancellation.
        let stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(TransportError::Cancelled);
            }
            result = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)) => {
                match result {
                    Ok(Ok(s)) => {
                        info!(addr = %self.addr, %method, "connected");
                        s
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(TransportError::Timeout),
                }
            }
        };
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let reader = BufReader::with_capacity(TCP_BUFFER_SIZE, reader);
        start_call_split(reader, writer, method).await
    }

    /// Performs a unary call: one request, exactly one response.
    pub async fn unary<Req, Resp>(&self, method: Method, req: &Req) -> Result<Resp, TransportError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let (mut writer, mut reader) = self.open(method).await?;
        writer.send_message(req).await?;
        writer.finish().await?;

        let resp = reader
            .next_message::<Resp>()
            .await?
            .ok_or_else(|| TransportError::Protocol(format!("{method}: missing response")))?;

        if reader.next_message::<Resp>().await?.is_some() {
            return Err(TransportError::Protocol(format!(
                "{method}: more than one response"
            )));
        }
        Ok(resp)
    }
}
