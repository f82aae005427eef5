use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::storage::{FileStorage, StorageResult};

/// Number of backup versions retained behind the current file.
pub const ROTATION_DEPTH: usize = 3;

/// Rotates versioned cache files so a corrupted current copy can fall back to
/// the newest readable backup.
///
/// Physical layout per logical key `K`: `K.json` is current, `K_v1.json` ..
/// `K_v3.json` are backups in descending freshness. Every rotation step is a
/// rename, so a crash mid-rotation leaves at least one intact copy.
#[derive(Debug, Clone)]
pub struct VersionRotator {
    storage: Arc<dyn FileStorage>,
}

impl VersionRotator {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        Self { storage }
    }

    pub fn current_path(key: &str) -> String {
        format!("{key}.json")
    }

    pub fn backup_path(key: &str, slot: usize) -> String {
        format!("{key}_v{slot}.json")
    }

    fn slot_path(key: &str, slot: usize) -> String {
        if slot == 0 { Self::current_path(key) } else { Self::backup_path(key, slot) }
    }

    /// Shift the existing version ladder down one slot, then write `bytes` as
    /// the new current file.
    ///
    /// A failed rotation step costs one backup slot, never the new data: the
    /// failure is logged and the write proceeds.
    pub async fn write(&self, key: &str, bytes: Bytes) -> StorageResult<()> {
        self.shift_versions(key).await;
        self.storage.write(&Self::current_path(key), bytes).await
    }

    async fn shift_versions(&self, key: &str) {
        let oldest = Self::backup_path(key, ROTATION_DEPTH);
        match self.storage.exists(&oldest).await {
            Ok(true) => {
                if let Err(err) = self.storage.delete(&oldest).await {
                    warn!(%key, error = %err, "could not discard oldest backup");
                }
            }
            Ok(false) => {}
            Err(err) => warn!(%key, error = %err, "could not probe oldest backup"),
        }

        for slot in (0..ROTATION_DEPTH).rev() {
            let from = Self::slot_path(key, slot);
            let to = Self::backup_path(key, slot + 1);
            match self.storage.exists(&from).await {
                Ok(true) => {
                    if let Err(err) = self.storage.rename(&from, &to).await {
                        warn!(%key, slot, error = %err, "rotation step failed, backup slot lost");
                    }
                }
                Ok(false) => {}
                Err(err) => warn!(%key, slot, error = %err, "could not probe version slot"),
            }
        }
    }

    /// Read the newest version of `key` that parses as `T`.
    ///
    /// Versions that are missing, unreadable, or fail to parse are skipped;
    /// corruption is logged, never surfaced. `None` means every version is
    /// absent or corrupt.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        for slot in 0..=ROTATION_DEPTH {
            let path = Self::slot_path(key, slot);
            let bytes = match self.storage.read(&path).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => {
                    warn!(%path, error = %err, "could not read cache version");
                    continue;
                }
            };
            match serde_json::from_slice(&bytes) {
                Ok(value) => return Some(value),
                Err(err) => {
                    warn!(%path, error = %err, "skipping corrupt cache version");
                }
            }
        }
        None
    }

    /// Delete the current file and every backup for `key`.
    pub async fn delete_all(&self, key: &str) -> StorageResult<()> {
        for slot in 0..=ROTATION_DEPTH {
            self.storage.delete(&Self::slot_path(key, slot)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::storage::{logging::LoggingStorage, new_in_memory_storage};

    fn payload(n: u32) -> Bytes {
        Bytes::from(format!("{{\"generation\": {n}}}"))
    }

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Generation {
        generation: u32,
    }

    #[tokio::test]
    async fn test_depth_is_bounded_and_newest_wins() {
        let storage = new_in_memory_storage();
        let files: Arc<dyn FileStorage> = storage.clone();
        let rotator = VersionRotator::new(Arc::clone(&files));

        for n in 0..7 {
            rotator.write("k", payload(n)).await.unwrap();
        }

        let mut names = files.list_files().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["k.json", "k_v1.json", "k_v2.json", "k_v3.json"]);

        let current: Generation = rotator.read("k").await.unwrap();
        assert_eq!(current, Generation { generation: 6 });
    }

    #[test_log::test(tokio::test)]
    async fn test_corrupt_current_falls_back_to_v1() {
        let storage = new_in_memory_storage();
        let files: Arc<dyn FileStorage> = storage.clone();
        let rotator = VersionRotator::new(Arc::clone(&files));

        rotator.write("k", payload(1)).await.unwrap();
        rotator.write("k", payload(2)).await.unwrap();
        files
            .write(&VersionRotator::current_path("k"), Bytes::from_static(b"{trunca"))
            .await
            .unwrap();

        let fallback: Generation = rotator.read("k").await.unwrap();
        assert_eq!(fallback, Generation { generation: 1 });
    }

    #[test_log::test(tokio::test)]
    async fn test_all_versions_corrupt_is_a_miss() {
        let storage = new_in_memory_storage();
        let files: Arc<dyn FileStorage> = storage.clone();
        let rotator = VersionRotator::new(Arc::clone(&files));

        files
            .write(&VersionRotator::current_path("k"), Bytes::from_static(b"not json"))
            .await
            .unwrap();
        files
            .write(&VersionRotator::backup_path("k", 1), Bytes::from_static(b"also bad"))
            .await
            .unwrap();

        assert_eq!(rotator.read::<Generation>("k").await, None);
    }

    #[tokio::test]
    async fn test_rotation_renames_instead_of_rewriting() {
        let storage = new_in_memory_storage();
        let logging = Arc::new(LoggingStorage::new(storage));
        let files: Arc<dyn FileStorage> = logging.clone();
        let rotator = VersionRotator::new(files);

        rotator.write("k", payload(1)).await.unwrap();
        logging.clear();
        rotator.write("k", payload(2)).await.unwrap();

        let renames: Vec<_> = logging
            .operations()
            .into_iter()
            .filter(|(op, _)| op == "rename")
            .collect();
        assert_eq!(renames, vec![("rename".to_string(), "k.json".to_string())]);

        let writes: Vec<_> = logging
            .operations()
            .into_iter()
            .filter(|(op, _)| op == "write")
            .collect();
        assert_eq!(writes, vec![("write".to_string(), "k.json".to_string())]);
    }

    #[tokio::test]
    async fn test_delete_all_removes_every_slot() {
        let storage = new_in_memory_storage();
        let files: Arc<dyn FileStorage> = storage.clone();
        let rotator = VersionRotator::new(Arc::clone(&files));

        for n in 0..5 {
            rotator.write("k", payload(n)).await.unwrap();
        }
        rotator.delete_all("k").await.unwrap();

        assert_eq!(files.list_files().await.unwrap(), Vec::<String>::new());
    }
}
