use std::{
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;

use super::{FileStorage, StorageResult};

/// Test-only wrapper recording every [`FileStorage`] operation against the
/// wrapped backend, so tests can assert exactly which paths were touched.
pub struct LoggingStorage {
    backend: Arc<dyn FileStorage>,
    op_log: Mutex<Vec<(String, String)>>,
}

impl LoggingStorage {
    pub fn new(backend: Arc<dyn FileStorage>) -> Self {
        Self { backend, op_log: Mutex::new(Vec::new()) }
    }

    #[allow(clippy::expect_used)] // this implementation is intended for tests only
    pub fn operations(&self) -> Vec<(String, String)> {
        self.op_log.lock().expect("poison lock").clone()
    }

    #[allow(clippy::expect_used)] // this implementation is intended for tests only
    pub fn clear(&self) {
        self.op_log.lock().expect("poison lock").clear();
    }

    #[allow(clippy::expect_used)] // this implementation is intended for tests only
    fn record(&self, op: &str, path: &str) {
        self.op_log.lock().expect("poison lock").push((op.to_string(), path.to_string()));
    }
}

impl fmt::Debug for LoggingStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoggingStorage(backend={:?})", self.backend)
    }
}

#[async_trait]
impl FileStorage for LoggingStorage {
    async fn write(&self, path: &str, bytes: Bytes) -> StorageResult<()> {
        self.record("write", path);
        self.backend.write(path, bytes).await
    }

    async fn read(&self, path: &str) -> StorageResult<Option<Bytes>> {
        self.record("read", path);
        self.backend.read(path).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.record("exists", path);
        self.backend.exists(path).await
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.record("delete", path);
        self.backend.delete(path).await
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        self.record("delete_prefix", prefix);
        self.backend.delete_prefix(prefix).await
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.record("rename", from);
        self.backend.rename(from, to).await
    }

    async fn list_files(&self) -> StorageResult<Vec<String>> {
        self.record("list_files", "");
        self.backend.list_files().await
    }
}
