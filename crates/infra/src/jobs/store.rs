//! Filesystem persistence for job records.

use std::path::{Path, PathBuf};

use tabops_core::JobId;

use super::types::JobRecord;

/// Errors from the record store. The manager layer degrades these to logged
/// no-ops; callers that want to surface storage outages use the store
/// directly.
#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One JSON document per job under a shared directory.
///
/// Writes go through a temp file plus rename so concurrent readers never see
/// a half-written record. Visibility across processes relies on every server
/// process mounting the same directory.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn job_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub async fn try_write(&self, id: JobId, record: &JobRecord) -> Result<(), JobStoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec(record)?;
        let path = self.job_path(id);
        let tmp = self.dir.join(format!("{id}.json.tmp"));
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn try_read(&self, id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        match tokio::fs::read(self.job_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn try_delete(&self, id: JobId) -> Result<(), JobStoreError> {
        match tokio::fs::remove_file(self.job_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Existence check without deserializing the record.
    pub async fn exists(&self, id: JobId) -> bool {
        tokio::fs::try_exists(self.job_path(id)).await.unwrap_or(false)
    }

    /// Every readable record in the store (diagnostics).
    pub async fn try_list(&self) -> Result<Vec<(JobId, JobRecord)>, JobStoreError> {
        let mut jobs = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(jobs),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(id) = stem.parse::<JobId>() else {
                continue;
            };
            if let Some(record) = self.try_read(id).await? {
                jobs.push((id, record));
            }
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabops_core::JobType;

    #[tokio::test]
    async fn write_read_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());
        let id = JobId::new();

        store.try_write(id, &JobRecord::new(JobType::Merge)).await.unwrap();
        assert!(store.exists(id).await);

        let record = store.try_read(id).await.unwrap().unwrap();
        assert_eq!(record.progress, 0);

        store.try_delete(id).await.unwrap();
        assert!(!store.exists(id).await);
        assert!(store.try_read(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_of_absent_record_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());
        store.try_delete(JobId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn list_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());

        let id = JobId::new();
        store.try_write(id, &JobRecord::new(JobType::Research)).await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"hi").await.unwrap();
        tokio::fs::write(dir.path().join("bad.json"), b"{}").await.unwrap();

        let jobs = store.try_list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].0, id);
    }

    #[tokio::test]
    async fn unreadable_directory_reports_errors() {
        // A path under a regular file can never become a directory.
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = FileJobStore::new(file.path().join("jobs"));
        let err = store
            .try_write(JobId::new(), &JobRecord::new(JobType::Merge))
            .await;
        assert!(err.is_err());
    }
}
