//! Local upload/result file management.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{error, info};

use tabops_core::FileId;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("No file selected")]
    MissingName,

    #[error("Unsupported file type. Use CSV or Excel.")]
    UnsupportedType(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A saved upload: id, resting place, extension.
#[derive(Debug, Clone)]
pub struct SavedUpload {
    pub file_id: FileId,
    pub path: PathBuf,
    pub extension: String,
}

/// Uploads and results directories on local disk.
///
/// Files are transient working state, not durable artifacts: anything older
/// than the cleanup horizon is deleted at startup.
#[derive(Debug, Clone)]
pub struct FileStore {
    upload_dir: PathBuf,
    results_dir: PathBuf,
}

impl FileStore {
    pub fn new(upload_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.results_dir).await?;
        Ok(())
    }

    /// Persist an upload under a fresh id, keyed by its (validated) extension.
    pub async fn save_upload(
        &self,
        original_name: &str,
        allowed_extensions: &[&str],
        bytes: &[u8],
    ) -> Result<SavedUpload, FileStoreError> {
        if original_name.is_empty() {
            return Err(FileStoreError::MissingName);
        }
        let extension = original_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        if !allowed_extensions.contains(&extension.as_str()) {
            return Err(FileStoreError::UnsupportedType(extension));
        }

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let file_id = FileId::new();
        let path = self.upload_dir.join(format!("{file_id}.{extension}"));
        tokio::fs::write(&path, bytes).await?;

        info!(?path, original_name, "saved upload");
        Ok(SavedUpload { file_id, path, extension })
    }

    /// Locate an upload by id, probing the allowed extensions.
    pub async fn find_upload(&self, file_id: FileId, extensions: &[&str]) -> Option<PathBuf> {
        for extension in extensions {
            let path = self.upload_dir.join(format!("{file_id}.{extension}"));
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    /// Resting place of a named result file.
    pub fn result_path(&self, name: &str) -> PathBuf {
        self.results_dir.join(name)
    }

    /// Persist a result file.
    pub async fn write_result(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.results_dir).await?;
        let path = self.result_path(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Delete files older than `hours` in `dir`. Returns how many went away.
    pub async fn cleanup_old_files(dir: &Path, hours: u64) -> usize {
        let cutoff = SystemTime::now() - Duration::from_secs(hours * 3600);
        let mut deleted = 0usize;

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()) == Some(".gitkeep") {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified < cutoff {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        info!(?path, "cleaned up old file");
                        deleted += 1;
                    }
                    Err(e) => error!(?path, "failed to clean up: {e}"),
                }
            }
        }

        if deleted > 0 {
            info!(deleted, ?dir, "cleanup pass finished");
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("uploads"), dir.path().join("results"));
        (dir, store)
    }

    #[tokio::test]
    async fn save_then_find_roundtrip() {
        let (_dir, store) = store();
        let saved = store
            .save_upload("contacts.CSV", EXTENSIONS, b"a,b\n1,2\n")
            .await
            .unwrap();
        assert_eq!(saved.extension, "csv");

        let found = store.find_upload(saved.file_id, EXTENSIONS).await.unwrap();
        assert_eq!(found, saved.path);
    }

    #[tokio::test]
    async fn rejects_unsupported_extensions() {
        let (_dir, store) = store();
        let err = store.save_upload("evil.exe", EXTENSIONS, b"x").await.unwrap_err();
        assert!(matches!(err, FileStoreError::UnsupportedType(_)));

        let err = store.save_upload("", EXTENSIONS, b"x").await.unwrap_err();
        assert!(matches!(err, FileStoreError::MissingName));
    }

    #[tokio::test]
    async fn missing_upload_is_none() {
        let (_dir, store) = store();
        assert!(store.find_upload(FileId::new(), EXTENSIONS).await.is_none());
    }

    #[tokio::test]
    async fn results_are_written_under_the_results_dir() {
        let (_dir, store) = store();
        let path = store.write_result("out.csv", b"a\n1\n").await.unwrap();
        assert!(path.starts_with(store.results_dir()));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"a\n1\n");
    }

    #[tokio::test]
    async fn cleanup_removes_only_old_files() {
        let (_dir, store) = store();
        store.ensure_dirs().await.unwrap();

        let fresh = store.upload_dir().join("fresh.csv");
        tokio::fs::write(&fresh, b"x").await.unwrap();

        // With a zero-hour horizon everything qualifies; with a large horizon
        // nothing does.
        assert_eq!(FileStore::cleanup_old_files(store.upload_dir(), 1000).await, 0);
        assert!(tokio::fs::try_exists(&fresh).await.unwrap());

        assert_eq!(FileStore::cleanup_old_files(store.upload_dir(), 0).await, 1);
        assert!(!tokio::fs::try_exists(&fresh).await.unwrap());
    }
}
