//! Object storage behind a small async capability surface.
//!
//! The S3 backend talks to MinIO in deployment. The in-memory backend is used by
//! tests; it keeps objects in a shared map so side effects can be asserted.

pub mod keys;
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use memory::InMemoryObjectStore;
pub use s3::StorageService;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()>;

    async fn get_object(&self, key: &str) -> StorageResult<Bytes>;

    /// `Ok(None)` means the store confirmed the key is absent.
    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMeta>>;

    /// Keys under `prefix`, lexicographically ordered.
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    async fn ping(&self) -> StorageResult<()>;
}
