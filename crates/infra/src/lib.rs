//! `tabops-infra` — infrastructure adapters.
//!
//! Everything stateful lives here: the job lifecycle manager backed by a
//! shared filesystem record store, the tiered expiring cache, the
//! S3-compatible object store gateway, local upload/result file management,
//! and the capped research run-history log.

pub mod cache;
pub mod files;
pub mod history;
pub mod jobs;
pub mod storage;

pub use cache::TieredCache;
pub use files::{FileStore, SavedUpload};
pub use history::{RunEntry, RunHistory};
pub use jobs::{FileJobStore, JobManager, JobPatch, JobRecord, JobStoreError};
pub use storage::{ObjectStore, S3ObjectStore, S3Settings, StorageError};
