//! Storage path resolution and file handles.

use std::path::{Component, Path, PathBuf};

use tokio::fs::File;
use tracing::debug;

use crate::FileOpsError;

/// Sub-directory of the storage directory that receives uploads.
pub const UPLOADS_DIR: &str = "uploads";

/// Validates that a client-supplied file name stays inside storage.
///
/// Rejects:
/// - Empty names
/// - Absolute paths
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_file_name(name: &str) -> Result<(), FileOpsError> {
    if name.is_empty() {
        return Err(FileOpsError::InvalidPath("empty file name".into()));
    }

    let path = Path::new(name);
    if path.is_absolute() {
        return Err(FileOpsError::InvalidPath(format!(
            "absolute path not allowed: {name}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(FileOpsError::InvalidPath(format!(
                    "parent directory traversal not allowed: {name}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(FileOpsError::InvalidPath(format!(
                    "absolute path not allowed: {name}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Joins a validated file name onto the storage directory.
pub fn resolve_storage_path(storage: &Path, name: &str) -> Result<PathBuf, FileOpsError> {
    validate_file_name(name)?;
    Ok(storage.join(name))
}

/// Opens a storage file for streaming.
pub async fn open_for_read(storage: &Path, name: &str) -> Result<File, FileOpsError> {
    let path = resolve_storage_path(storage, name)?;
    let file = File::open(&path)
        .await
        .map_err(|e| FileOpsError::io(&path, e))?;

    let metadata = file
        .metadata()
        .await
        .map_err(|e| FileOpsError::io(&path, e))?;
    if metadata.is_dir() {
        return Err(FileOpsError::InvalidPath(format!("not a file: {name}")));
    }

    debug!(path = %path.display(), size = metadata.len(), "opened for read");
    Ok(file)
}

/// Creates the storage directory (and its uploads directory) if missing.
pub async fn ensure_storage_dir(storage: &Path) -> Result<(), FileOpsError> {
    let uploads = storage.join(UPLOADS_DIR);
    tokio::fs::create_dir_all(&uploads)
        .await
        .map_err(|e| FileOpsError::io(&uploads, e))
}

/// Creates a fresh, uniquely named upload target.
pub async fn create_upload_file(storage: &Path) -> Result<(PathBuf, File), FileOpsError> {
    ensure_storage_dir(storage).await?;
    let path = storage
        .join(UPLOADS_DIR)
        .join(format!("upload-{}.bin", uuid::Uuid::new_v4()));
    let file = File::create(&path)
        .await
        .map_err(|e| FileOpsError::io(&path, e))?;
    debug!(path = %path.display(), "upload target created");
    Ok((path, file))
}

/// Expands a `~` prefix to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let home = || {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    };
    if let Some(rest) = path.strip_prefix("~/") {
        home().join(rest)
    } else if path == "~" {
        home()
    } else {
        PathBuf::from(path)
    }
}
