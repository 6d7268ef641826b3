use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{KeyValueStore, namespaced};
use crate::error::Error;

/// JSON-file backed store that survives process restarts.
///
/// Each value is encoded to a JSON string before it is written, and the whole
/// map is rewritten on every mutation. Entries are loaded on `connect`; a
/// mutation becomes visible only once it has reached the disk.
#[derive(Debug)]
pub struct FileStore {
    prefix: String,
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    /// Store under the platform's per-user data directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsuitablePlatform`] where no such directory exists.
    pub fn in_data_dir(app_name: &str, prefix: impl Into<String>) -> Result<Self, Error> {
        let dir = dirs::data_dir().ok_or_else(|| {
            Error::UnsuitablePlatform("no per-user data directory on this platform".into())
        })?;
        Ok(Self::new(dir.join(app_name).join("store.json"), prefix))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), Error> {
        let encoded = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, encoded).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn connect(&self) -> Result<(), Error> {
        let mut guard = self.entries.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::UnsuitablePlatform(format!("{}: {e}", parent.display()))
                })?;
            }
        }
        let entries = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        *guard = Some(entries);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Error> {
        *self.entries.lock().await = None;
        Ok(())
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<(), Error> {
        let mut guard = self.entries.lock().await;
        let mut entries = guard.clone().ok_or(Error::StorageIsNotConnected)?;
        entries.insert(namespaced(&self.prefix, key), serde_json::to_string(&value)?);
        self.flush(&entries).await?;
        *guard = Some(entries);
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<Value>, Error> {
        let guard = self.entries.lock().await;
        let entries = guard.as_ref().ok_or(Error::StorageIsNotConnected)?;
        entries
            .get(&namespaced(&self.prefix, key))
            .map(|raw| serde_json::from_str::<Value>(raw))
            .transpose()
            .map_err(Into::into)
    }

    async fn remove_item(&self, key: &str) -> Result<(), Error> {
        let mut guard = self.entries.lock().await;
        let mut entries = guard.clone().ok_or(Error::StorageIsNotConnected)?;
        if entries.remove(&namespaced(&self.prefix, key)).is_some() {
            self.flush(&entries).await?;
            *guard = Some(entries);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut guard = self.entries.lock().await;
        let mut entries = guard.clone().ok_or(Error::StorageIsNotConnected)?;
        let scope = namespaced(&self.prefix, "");
        entries.retain(|key, _| !key.starts_with(&scope));
        self.flush(&entries).await?;
        *guard = Some(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KeyValueStoreExt;

    #[tokio::test]
    async fn values_survive_a_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth").join("store.json");

        let first = FileStore::new(&path, "chainauth");
        first.connect().await.unwrap();
        first.set_item("state", "abc").await.unwrap();
        drop(first);

        let second = FileStore::new(&path, "chainauth");
        second.connect().await.unwrap();
        let state: Option<String> = second.get_item("state").await.unwrap();
        assert_eq!(state.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn values_are_string_encoded_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(&path, "p");
        store.connect().await.unwrap();
        store.set_item("flag", &true).await.unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw.get("p:flag").map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn not_connected_until_connect() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"), "p");
        assert!(!store.is_connected().await);
        store.connect().await.unwrap();
        assert!(store.is_connected().await);
    }

    #[tokio::test]
    async fn failed_write_is_not_visible() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("auth");
        let store = FileStore::new(parent.join("store.json"), "p");
        store.connect().await.unwrap();
        store.set_item("kept", "yes").await.unwrap();

        std::fs::remove_dir_all(&parent).unwrap();
        assert!(store.set_item("state", "abc").await.is_err());
        assert!(store.remove_item("kept").await.is_err());
        assert!(store.clear().await.is_err());

        let state: Option<String> = store.get_item("state").await.unwrap();
        assert!(state.is_none());
        let kept: Option<String> = store.get_item("kept").await.unwrap();
        assert_eq!(kept.as_deref(), Some("yes"));
    }
}
