use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::GridError;

/// Key/value store provided by the host (browser local storage, a settings
/// file, ...). Values are JSON documents.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, GridError>;
    async fn set_raw(&self, key: &str, value: String) -> Result<(), GridError>;
    async fn remove_item(&self, key: &str) -> Result<(), GridError>;
}

/// Typed access on top of [`LocalStorage`].
#[async_trait]
pub trait LocalStorageExt: LocalStorage {
    /// Reads and deserializes a value. A value that no longer parses is
    /// reported as an error so callers can decide to fall back.
    async fn get_item<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, GridError> {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_item<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), GridError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, raw).await
    }
}

impl<S: LocalStorage + ?Sized> LocalStorageExt for S {}

/// Storage key namespaced per application.
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{}:{}", namespace, key)
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, GridError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), GridError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), GridError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Local storage persisted as one JSON object on disk.
pub struct JsonFileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
    load_warning: Mutex<Option<String>>,
}

impl JsonFileStorage {
    /// Storage file under the platform config directory.
    pub fn new(app_name: &str) -> Result<Self, GridError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            GridError::IoError(std::io::Error::other("Could not find config directory"))
        })?;

        let app_dir = config_dir.join(app_name);
        fs::create_dir_all(&app_dir).map_err(GridError::IoError)?;

        Self::from_path(app_dir.join("local_storage.json"))
    }

    pub fn from_path(path: PathBuf) -> Result<Self, GridError> {
        let (entries, load_warning) = Self::load_from_path(&path)?;

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            load_warning: Mutex::new(load_warning),
        })
    }

    fn load_from_path(path: &Path) -> Result<(BTreeMap<String, String>, Option<String>), GridError> {
        if !path.exists() {
            return Ok((BTreeMap::new(), None));
        }

        let content = fs::read_to_string(path).map_err(GridError::IoError)?;

        match serde_json::from_str(&content) {
            Ok(entries) => Ok((entries, None)),
            Err(err) => {
                let backup_path =
                    path.with_extension(format!("corrupt-{}", Utc::now().format("%Y%m%d%H%M%S")));

                if let Err(rename_err) = fs::rename(path, &backup_path) {
                    log::warn!(
                        "Failed to backup corrupted storage file: {} (original parse error: {})",
                        rename_err,
                        err
                    );
                } else {
                    log::warn!(
                        "Storage file was corrupted. Backup created at {:?}: {}",
                        backup_path,
                        err
                    );
                }

                Ok((
                    BTreeMap::new(),
                    Some("Grid settings file was corrupted and has been reset.".to_string()),
                ))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn take_load_warning(&self) -> Option<String> {
        match self.load_warning.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), GridError> {
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content).map_err(GridError::IoError)
    }
}

#[async_trait]
impl LocalStorage for JsonFileStorage {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, GridError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), GridError> {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    async fn remove_item(&self, key: &str) -> Result<(), GridError> {
        let mut entries = self.entries();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn typed_round_trip_in_memory() {
        let storage = MemoryStorage::new();
        storage.set_item("k", &vec![1, 2, 3]).await.unwrap();

        let value: Option<Vec<i32>> = storage.get_item("k").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));

        storage.remove_item("k").await.unwrap();
        let value: Option<Vec<i32>> = storage.get_item("k").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn file_storage_persists_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let storage = JsonFileStorage::from_path(path.clone()).unwrap();
        storage.set_raw("lgrid:a", "\"x\"".into()).await.unwrap();

        let reopened = JsonFileStorage::from_path(path).unwrap();
        assert_eq!(reopened.get_raw("lgrid:a").await.unwrap().as_deref(), Some("\"x\""));
    }

    #[tokio::test]
    async fn corrupted_file_is_reset_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{ not json").unwrap();

        let storage = JsonFileStorage::from_path(path).unwrap();
        assert!(storage.take_load_warning().is_some());
        assert_eq!(storage.get_raw("anything").await.unwrap(), None);
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(namespaced_key("app", "people-0"), "app:people-0");
    }
}
