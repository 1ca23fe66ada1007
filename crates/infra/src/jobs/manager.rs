//! The job lifecycle manager.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use tabops_core::{JobId, JobType};

use super::store::FileJobStore;
use super::types::{JobPatch, JobRecord};

/// Owns the job record store and the registry of cancellable worker tasks.
///
/// Handlers and workers only ever go through this type; the silent-swallowing
/// contract lives here (storage failures log and degrade), while
/// [`JobManager::store`] exposes the `Result`-returning layer for callers
/// that need to observe outages.
pub struct JobManager {
    store: FileJobStore,
    tasks: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl JobManager {
    pub fn new(jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: FileJobStore::new(jobs_dir),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &FileJobStore {
        &self.store
    }

    /// Insert a fresh `processing` record. Callers must not assume durability:
    /// a storage failure is logged and swallowed.
    pub async fn create(&self, id: JobId, job_type: JobType) {
        match self.store.try_write(id, &JobRecord::new(job_type)).await {
            Ok(()) => info!(%id, job_type = job_type.as_str(), "created job"),
            Err(e) => error!(%id, "failed to create job: {e}"),
        }
    }

    /// Merge `patch` into the record. A missing job or storage failure is a
    /// logged no-op; updates never raise to the worker.
    pub async fn update(&self, id: JobId, patch: JobPatch) {
        let mut record = match self.store.try_read(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(%id, "update for unknown job ignored");
                return;
            }
            Err(e) => {
                error!(%id, "failed to read job for update: {e}");
                return;
            }
        };
        record.apply(patch);
        if let Err(e) = self.store.try_write(id, &record).await {
            error!(%id, "failed to write job update: {e}");
        }
    }

    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        match self.store.try_read(id).await {
            Ok(record) => record,
            Err(e) => {
                error!(%id, "failed to read job: {e}");
                None
            }
        }
    }

    pub async fn exists(&self, id: JobId) -> bool {
        self.store.exists(id).await
    }

    /// Remove the record and cancel any registered worker task.
    /// Deleting a job that does not exist is a silent no-op.
    pub async fn delete(&self, id: JobId) {
        if let Err(e) = self.store.try_delete(id).await {
            error!(%id, "failed to delete job: {e}");
        }
        self.cancel_task(id);
    }

    /// Every tracked job (diagnostics).
    pub async fn all(&self) -> Vec<(JobId, JobRecord)> {
        match self.store.try_list().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("failed to list jobs: {e}");
                Vec::new()
            }
        }
    }

    /// Associate a cancellable task handle with a job. Only cooperative
    /// task-based workers register; blocking-pool workers cannot be
    /// cancelled through this mechanism.
    pub fn register_task(&self, id: JobId, handle: JoinHandle<()>) {
        self.tasks.lock().unwrap().insert(id, handle);
    }

    /// Abort the registered task if it is still running. Returns whether a
    /// cancellation was attempted.
    pub fn cancel_task(&self, id: JobId) -> bool {
        let handle = self.tasks.lock().unwrap().remove(&id);
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!(%id, "cancelled job task");
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabops_core::JobStatus;

    fn manager() -> (tempfile::TempDir, JobManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = JobManager::new(dir.path());
        (dir, manager)
    }

    #[tokio::test]
    async fn create_then_get_returns_processing_at_zero() {
        let (_dir, manager) = manager();
        let id = JobId::new();
        manager.create(id, JobType::Merge).await;

        let record = manager.get(id).await.unwrap();
        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(record.progress, 0);
    }

    #[tokio::test]
    async fn update_on_missing_job_is_a_no_op() {
        let (_dir, manager) = manager();
        let id = JobId::new();
        manager.update(id, JobPatch::progress(50, "half way")).await;
        assert!(manager.get(id).await.is_none());
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let (_dir, manager) = manager();
        let id = JobId::new();
        manager.create(id, JobType::Merge).await;
        manager.update(id, JobPatch::progress(20, "Reading File A...")).await;
        manager
            .update(
                id,
                JobPatch {
                    progress: Some(35),
                    ..JobPatch::default()
                },
            )
            .await;

        let record = manager.get(id).await.unwrap();
        assert_eq!(record.progress, 35);
        assert_eq!(record.message, "Reading File A...");
    }

    #[tokio::test]
    async fn delete_then_get_is_absent_and_absent_delete_is_silent() {
        let (_dir, manager) = manager();
        let id = JobId::new();
        manager.create(id, JobType::Research).await;
        assert!(manager.exists(id).await);

        manager.delete(id).await;
        assert!(!manager.exists(id).await);
        assert!(manager.get(id).await.is_none());

        // Second delete must not panic or error.
        manager.delete(id).await;
    }

    #[tokio::test]
    async fn storage_outage_degrades_to_silent_no_ops() {
        // Point the manager at a path that can never become a directory.
        let file = tempfile::NamedTempFile::new().unwrap();
        let manager = JobManager::new(file.path().join("jobs"));
        let id = JobId::new();

        manager.create(id, JobType::Merge).await;
        manager.update(id, JobPatch::progress(10, "loading")).await;
        assert!(manager.get(id).await.is_none());
        assert!(!manager.exists(id).await);
        assert!(manager.all().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_aborts_registered_tasks() {
        let (_dir, manager) = manager();
        let id = JobId::new();

        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        manager.register_task(id, handle);

        assert!(manager.cancel_task(id));
        // Handle is consumed; a second cancel finds nothing.
        assert!(!manager.cancel_task(id));
    }

    #[tokio::test]
    async fn all_lists_created_jobs() {
        let (_dir, manager) = manager();
        manager.create(JobId::new(), JobType::Merge).await;
        manager.create(JobId::new(), JobType::Research).await;
        assert_eq!(manager.all().await.len(), 2);
    }
}
