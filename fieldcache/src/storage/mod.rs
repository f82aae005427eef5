use core::fmt;
use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[cfg(test)]
pub mod logging;

pub mod object_store;

pub use object_store::ObjectStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("error contacting object store: {0}")]
    ObjectStore(#[from] ::object_store::Error),
    #[error("cannot serialize record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type StorageResult<A> = Result<A, StorageError>;

/// Small JSON records under string keys, the settings-style store.
///
/// Absent keys are `Ok(None)`, never an error. Concurrent writes to the same
/// key are last-write-wins; the façades never race conflicting writes to one
/// key (the in-flight table serializes fetches per key).
#[async_trait]
pub trait RecordStorage: fmt::Debug + Send + Sync {
    async fn put(&self, key: &str, value: &serde_json::Value) -> StorageResult<()>;
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;
    async fn delete(&self, key: &str) -> StorageResult<()>;
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()>;
    async fn list_keys(&self) -> StorageResult<Vec<String>>;
}

/// File-per-entry payload store for the larger time-series documents.
///
/// `rename` must be failure-atomic: after it returns, either the old path is
/// gone and the new one present, or the old path is still intact. Version
/// rotation correctness rests on this.
#[async_trait]
pub trait FileStorage: fmt::Debug + Send + Sync {
    async fn write(&self, path: &str, bytes: Bytes) -> StorageResult<()>;
    async fn read(&self, path: &str) -> StorageResult<Option<Bytes>>;
    async fn exists(&self, path: &str) -> StorageResult<bool>;
    async fn delete(&self, path: &str) -> StorageResult<()>;
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()>;
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;
    async fn list_files(&self) -> StorageResult<Vec<String>>;
}

/// Create an ephemeral storage backend, mostly useful for tests.
pub fn new_in_memory_storage() -> Arc<ObjectStorage> {
    Arc::new(ObjectStorage::new_in_memory())
}

/// Create a storage backend rooted at `prefix` on the local filesystem,
/// creating the directory if needed.
pub fn new_local_filesystem_storage(prefix: &Path) -> StorageResult<Arc<ObjectStorage>> {
    Ok(Arc::new(ObjectStorage::new_local_filesystem(prefix)?))
}
