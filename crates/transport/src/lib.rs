//! Duplex message streams for filestream calls.
//!
//! Every call runs on its own connection. The client writes a CALL frame
//! naming the method, then both sides exchange typed messages in
//! independent directions. Each direction ends with its own END frame
//! (half-close); the server may end its direction with a STATUS frame
//! instead to report a terminal error.
//!
//! # Wire format
//!
//! See [`wire`] module for the frame layout.

pub mod client;
pub mod error;
pub mod server;
pub mod stream;
pub mod wire;

pub use client::{Channel, TcpCall, start_call, start_call_split};
pub use error::TransportError;
pub use server::{RpcServer, ServerCall, Service, ServiceFuture, serve_connection};
pub use stream::{FrameReader, FrameWriter, MessageSink, MessageSource, TransportFuture};

use std::time::Duration;

/// TCP read buffer size (64 KB).
pub const TCP_BUFFER_SIZE: usize = 64 * 1024;

/// Timeout for the TCP connection attempt.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time the server waits for the CALL frame after accepting a connection.
pub const CALL_HEADER_TIMEOUT: Duration = Duration::from_secs(5);
