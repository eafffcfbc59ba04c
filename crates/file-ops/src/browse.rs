//! Directory listing for `ListFiles`.

use std::path::Path;

use tracing::debug;

use crate::FileOpsError;

/// Lists the regular files in `dir`.
///
/// Sub-directories are excluded. Names are sorted so listings are
/// stable across platforms.
pub async fn list_entries(dir: &Path) -> Result<Vec<String>, FileOpsError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| FileOpsError::io(dir, e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FileOpsError::io(dir, e))?
    {
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(e) => {
                debug!(entry = ?entry.path(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        if file_type.is_dir() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }

    names.sort();
    debug!(dir = %dir.display(), count = names.len(), "listed storage");
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path();

        std::fs::write(base.join("sports.txt"), "data").unwrap();
        std::fs::write(base.join("name.txt"), "data").unwrap();
        std::fs::create_dir(base.join("uploads")).unwrap();

        let names = list_entries(base).await.unwrap();
        assert_eq!(names, vec!["name.txt", "sports.txt"]);
    }

    #[tokio::test]
    async fn empty_directory_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_entries(tmp.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let result = list_entries(&tmp.path().join("nope")).await;
        assert!(matches!(result, Err(FileOpsError::NotFound(_))));
    }
}
