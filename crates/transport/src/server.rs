//! Server side: accepts connections and dispatches calls to a [`Service`].
//!
//! The runtime owns both directions of every call. A handler receives the
//! call, reads and writes through it, and returns. On `Ok` the runtime
//! ends the outbound direction with END (unless the handler already did),
//! on `Err(status)` it ends it with STATUS.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use filestream_protocol::{CallHeader, Method, Status};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::stream::{FrameReader, FrameWriter};
use crate::wire::{FrameKind, read_frame};
use crate::{CALL_HEADER_TIMEOUT, TCP_BUFFER_SIZE};

/// Type-erased inbound half of a connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Type-erased outbound half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A boxed future returned by service handlers.
pub type ServiceFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Status>> + Send + 'a>>;

/// Trait for handling calls.
///
/// Implementors provide the domain logic; the runtime handles connection
/// management, the CALL frame and the terminal END/STATUS frame.
pub trait Service: Send + Sync + 'static {
    /// Handles one call. `call.method()` names the procedure.
    fn call<'a>(&'a self, call: &'a mut ServerCall) -> ServiceFuture<'a>;
}

/// One inbound call as seen by a [`Service`].
pub struct ServerCall {
    method: Method,
    peer: String,
    reader: FrameReader<BoxedReader>,
    writer: FrameWriter<BoxedWriter>,
}

impl ServerCall {
    pub fn method(&self) -> Method {
        self.method
    }

    /// Remote address (or a test label).
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Borrows both directions at once so they can be driven together.
    pub fn streams(&mut self) -> (&mut FrameReader<BoxedReader>, &mut FrameWriter<BoxedWriter>) {
        (&mut self.reader, &mut self.writer)
    }

    pub fn reader(&mut self) -> &mut FrameReader<BoxedReader> {
        &mut self.reader
    }

    pub fn writer(&mut self) -> &mut FrameWriter<BoxedWriter> {
        &mut self.writer
    }

    /// Reads the single request message of a unary or server-streaming call.
    pub async fn request<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, Status> {
        match self.reader.next_message::<T>().await {
            Ok(Some(req)) => Ok(req),
            Ok(None) => Err(Status::invalid_argument(format!(
                "{}: missing request",
                self.method
            ))),
            Err(TransportError::Json(e)) => Err(Status::invalid_argument(format!(
                "{}: invalid request: {e}",
                self.method
            ))),
            Err(e) => Err(Status::aborted(format!("{}: {e}", self.method))),
        }
    }
}

/// Serves every call of one connection.
///
/// Reads the CALL frame, runs the handler and writes the terminal frame.
pub async fn serve_connection<S>(
    service: Arc<S>,
    reader: BoxedReader,
    writer: BoxedWriter,
    peer: String,
    cancel: CancellationToken,
) -> Result<(), TransportError>
where
    S: Service + ?Sized,
{
    let mut reader = reader;

    // Wait for the call header with timeout + cancellation.
    let frame = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(TransportError::Cancelled);
        }
        result = tokio::time::timeout(CALL_HEADER_TIMEOUT, read_frame(&mut reader)) => {
            match result {
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => {
                    debug!(%peer, "connection closed before call header");
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(TransportError::Timeout),
            }
        }
    };

    if frame.kind != FrameKind::Call {
        return Err(TransportError::Protocol(format!(
            "expected call header, got {:?} frame",
            frame.kind
        )));
    }
    let header: CallHeader = frame.decode()?;
    info!(%peer, method = %header.method, "call started");

    let mut call = ServerCall {
        method: header.method,
        peer,
        reader: FrameReader::new(reader),
        writer: FrameWriter::new(writer),
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => Err(Status::aborted("server shutting down")),
        result = service.call(&mut call) => result,
    };

    match result {
        Ok(()) => {
            call.writer.finish().await?;
            info!(peer = %call.peer, method = %call.method, "call completed");
        }
        Err(status) => {
            warn!(peer = %call.peer, method = %call.method, %status, "call failed");
            if call.writer.is_closed() {
                debug!("outbound direction already closed, status not sent");
            } else if let Err(e) = call.writer.fail(&status).await {
                debug!("failed to deliver status: {e}");
            }
        }
    }
    Ok(())
}

/// Accepts TCP connections and serves one call per connection.
pub struct RpcServer<S: Service> {
    service: Arc<S>,
    cancel: CancellationToken,
}

impl<S: Service> RpcServer<S> {
    pub fn new(service: S, cancel: CancellationToken) -> Self {
        Self {
            service: Arc::new(service),
            cancel,
        }
    }

    /// Binds the listener.
    ///
    /// Port 0 asks the OS for an ephemeral port; read it back with
    /// `listener.local_addr()`.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<TcpListener, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "file service listener bound");
        Ok(listener)
    }

    /// Gracefully shuts down the server and aborts in-flight calls.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the accept loop until cancellation.
    pub async fn run(&self, listener: TcpListener) -> Result<(), TransportError> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(%peer_addr, "set_nodelay failed: {e}");
                            }
                            self.spawn_connection(stream, peer_addr);
                        }
                        Err(e) => {
                            error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, peer_addr: SocketAddr) {
        let (reader, writer) = stream.into_split();
        let reader: BoxedReader = Box::new(BufReader::with_capacity(TCP_BUFFER_SIZE, reader));
        let writer: BoxedWriter = Box::new(writer);
        let service = Arc::clone(&self.service);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let peer = peer_addr.to_string();
            if let Err(e) = serve_connection(service, reader, writer, peer, cancel).await {
                error!(%peer_addr, "connection error: {e}");
            }
        });
    }
}
