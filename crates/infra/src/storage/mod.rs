//! Object storage gateway.

pub mod s3;

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::delete_object::DeleteObjectError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use bytes::Bytes;
use thiserror::Error;

pub use s3::{S3ObjectStore, S3Settings};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to get object: {0}")]
    GetObject(#[from] SdkError<GetObjectError>),
    #[error("failed to put object: {0}")]
    PutObject(#[from] SdkError<PutObjectError>),
    #[error("failed to check object: {0}")]
    HeadObject(#[from] SdkError<HeadObjectError>),
    #[error("failed to delete object: {0}")]
    DeleteObject(#[from] SdkError<DeleteObjectError>),
    #[error("failed to stream object: {0}")]
    ObjectStream(String),
    #[error("failed to presign request: {0}")]
    Presign(String),
}

/// Object storage operations used by the large-file workflows.
///
/// Presigned URLs let clients move bytes directly against the bucket without
/// passing through the application server.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes.
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Store an object.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError>;

    /// Existence check without downloading (head request).
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Presigned download URL.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;

    /// Presigned direct-upload URL.
    async fn presign_put(&self, key: &str, expires_in: Duration) -> Result<String, StorageError>;
}
