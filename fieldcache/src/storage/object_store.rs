use core::fmt;
use std::{fs::create_dir_all, path::Path, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{
    ObjectStore, PutPayload, local::LocalFileSystem, memory::InMemory,
    path::Path as ObjectPath,
};

use super::{FileStorage, RecordStorage, StorageResult};

const RECORD_PREFIX: &str = "r";
const FILE_PREFIX: &str = "f";

/// Storage backend over an [`ObjectStore`]: records under `r/`, series files
/// under `f/`. One substrate serves both capability profiles, so the
/// in-memory store covers both in tests.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectStorage {
    pub fn new_in_memory() -> ObjectStorage {
        ObjectStorage { store: Arc::new(InMemory::new()), prefix: "".to_string() }
    }

    pub fn new_local_filesystem(prefix: &Path) -> StorageResult<ObjectStorage> {
        create_dir_all(prefix)?;
        let store = Arc::new(LocalFileSystem::new_with_prefix(prefix)?);
        Ok(ObjectStorage { store, prefix: "".to_string() })
    }

    fn record_path(&self, key: &str) -> ObjectPath {
        // ObjectPath knows how to deal with empty path parts: bar//foo
        ObjectPath::from(format!("{}/{}/{}.json", self.prefix, RECORD_PREFIX, key))
    }

    fn file_path(&self, name: &str) -> ObjectPath {
        ObjectPath::from(format!("{}/{}/{}", self.prefix, FILE_PREFIX, name))
    }

    fn drop_prefix(&self, kind: &str, location: &ObjectPath) -> Option<String> {
        location
            .prefix_match(&ObjectPath::from(format!("{}/{}", self.prefix, kind)))
            .map(|parts| {
                parts.map(|p| p.as_ref().to_string()).collect::<Vec<_>>().join("/")
            })
    }

    async fn get_bytes(&self, path: &ObjectPath) -> StorageResult<Option<Bytes>> {
        match self.store.get(path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_quiet(&self, path: &ObjectPath) -> StorageResult<()> {
        match self.store.delete(path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_under(&self, kind: &str) -> StorageResult<Vec<String>> {
        let prefix = ObjectPath::from(format!("{}/{}", self.prefix, kind));
        let metas: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;
        Ok(metas
            .iter()
            .filter_map(|meta| self.drop_prefix(kind, &meta.location))
            .collect())
    }
}

impl fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectStorage, prefix={}, store={}", self.prefix, self.store)
    }
}

#[async_trait]
impl RecordStorage for ObjectStorage {
    async fn put(&self, key: &str, value: &serde_json::Value) -> StorageResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.put(&self.record_path(key), PutPayload::from(bytes)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        match self.get_bytes(&self.record_path(key)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.delete_quiet(&self.record_path(key)).await
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        for key in RecordStorage::list_keys(self).await? {
            if key.starts_with(prefix) {
                RecordStorage::delete(self, &key).await?;
            }
        }
        Ok(())
    }

    async fn list_keys(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .list_under(RECORD_PREFIX)
            .await?
            .into_iter()
            .map(|name| name.strip_suffix(".json").map(str::to_string).unwrap_or(name))
            .collect())
    }
}

#[async_trait]
impl FileStorage for ObjectStorage {
    async fn write(&self, path: &str, bytes: Bytes) -> StorageResult<()> {
        self.store.put(&self.file_path(path), PutPayload::from(bytes)).await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> StorageResult<Option<Bytes>> {
        self.get_bytes(&self.file_path(path)).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self.store.head(&self.file_path(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        self.delete_quiet(&self.file_path(path)).await
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        for name in FileStorage::list_files(self).await? {
            if name.starts_with(prefix) {
                FileStorage::delete(self, &name).await?;
            }
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.store.rename(&self.file_path(from), &self.file_path(to)).await?;
        Ok(())
    }

    async fn list_files(&self) -> StorageResult<Vec<String>> {
        self.list_under(FILE_PREFIX).await
    }
}
