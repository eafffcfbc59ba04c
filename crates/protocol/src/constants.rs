use serde::{Deserialize, Serialize};

/// Maximum payload size of a single frame (16 MiB).
///
/// Chunk payloads are base64 inside JSON, so the largest usable chunk size
/// is roughly three quarters of this.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest chunk size that always fits in one frame once encoded (8 MiB).
pub const MAX_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Default TCP port of the file service.
pub const DEFAULT_PORT: u16 = 8080;

/// Remote procedure identifier, sent once at the start of every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Unary: one `ListFilesRequest`, one `ListFilesResponse`.
    #[serde(rename = "list_files")]
    ListFiles,
    /// Server streaming: one `DownloadRequest`, many `DownloadChunk`s.
    #[serde(rename = "download")]
    Download,
    /// Client streaming: many `UploadChunk`s, one `UploadSummary`.
    #[serde(rename = "upload")]
    Upload,
    /// Bidirectional: many `UploadChunk`s, one `ProgressAck` per chunk.
    #[serde(rename = "upload_and_notify_progress")]
    UploadAndNotifyProgress,

    /// Forward compatibility: unknown methods deserialize here.
    #[serde(other)]
    Unknown,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::ListFiles => "list_files",
            Method::Download => "download",
            Method::Upload => "upload",
            Method::UploadAndNotifyProgress => "upload_and_notify_progress",
            Method::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status codes carried by a STATUS frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    InvalidArgument,
    NotFound,
    Unimplemented,
    Internal,
    Aborted,

    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatusCode::InvalidArgument => "invalid argument",
            StatusCode::NotFound => "not found",
            StatusCode::Unimplemented => "unimplemented",
            StatusCode::Internal => "internal",
            StatusCode::Aborted => "aborted",
            StatusCode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
