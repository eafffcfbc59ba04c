//! Error types for the stream transport.

use filestream_protocol::Status;

/// Errors produced by the stream transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("remote error: {0}")]
    Status(Status),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("connection closed before end-of-stream")]
    ConnectionLost,

    #[error("send after half-close")]
    Closed,

    #[error("connection timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}
