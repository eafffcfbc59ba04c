pub mod constants;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::{Method, StatusCode};
pub use envelope::{CallHeader, Status};
pub use messages::{
    DownloadChunk, DownloadRequest, ListFilesRequest, ListFilesResponse, ProgressAck,
    UploadChunk, UploadSummary,
};
