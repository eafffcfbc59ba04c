//! Storage directory operations for the file service.
//!
//! Provides directory listing, safe resolution of client-supplied file
//! names, and creation of upload targets.

mod browse;
mod storage;

pub use browse::list_entries;
pub use storage::{
    UPLOADS_DIR, create_upload_file, ensure_storage_dir, expand_home, open_for_read,
    resolve_storage_path, validate_file_name,
};

/// Name of the storage directory under the local root.
pub const STORAGE_DIR: &str = "storage";

/// Errors produced by file operations.
#[derive(Debug, thiserror::Error)]
pub enum FileOpsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl FileOpsError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(path.display().to_string());
        }
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
