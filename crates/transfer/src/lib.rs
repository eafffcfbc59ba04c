//! Chunked file transfer over call streams.
//!
//! The client side pushes a byte source through the [`send_chunks`] loop
//! while [`receive_progress`] consumes the server's acknowledgements on the
//! other direction. [`TransferCoordinator`] runs the two as independent
//! tasks. The server side is the [`UploadAccumulator`] state machine.

mod accumulator;
mod chunk;
mod coordinator;
mod download;
mod receiver;
mod sender;
mod upload;

#[cfg(test)]
mod testing;

use std::time::Duration;

use filestream_transport::TransportError;

pub use accumulator::{AccumulatorState, UploadAccumulator, UploadReport, collect_upload};
pub use chunk::{Chunk, ChunkReader};
pub use coordinator::{TransferCoordinator, TransferOutcome};
pub use download::{download, serve_download};
pub use receiver::{ProgressSummary, receive_progress};
pub use sender::{SendSummary, send_chunks};
pub use upload::upload;

/// Default chunk size: 5 bytes.
///
/// Deliberately tiny so progress is visible on small files. Real
/// deployments should configure 32-64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 5;

/// Pacing delay applied per chunk in debug mode.
pub const DEBUG_CHUNK_DELAY: Duration = Duration::from_secs(1);

/// Tuning for one transfer, passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Maximum bytes per chunk. `0` falls back to [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: usize,
    /// Optional pause after each chunk is sent.
    pub chunk_delay: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: None,
        }
    }
}

impl TransferConfig {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_delay: None,
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Effective chunk size after applying the default.
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }
}

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The byte source or sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(TransportError),

    /// The peer sent something the transfer cannot accept.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("transfer cancelled")]
    Cancelled,

    /// A transfer task panicked or was aborted.
    #[error("transfer task failed: {0}")]
    TaskFailed(String),
}

impl From<TransportError> for TransferError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Protocol(msg) => Self::ProtocolViolation(msg),
            TransportError::Cancelled => Self::Cancelled,
            other => Self::Transport(other),
        }
    }
}

impl TransferError {
    /// Returns `true` for errors that only follow from another failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
