use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{KeyValueStore, namespaced};
use crate::error::Error;

/// In-process store. Values are kept verbatim, without a string encoding.
///
/// Clones share the same map, which is how tests stand in for two page loads
/// sharing browser storage.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    prefix: String,
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    connected: AtomicBool,
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: Arc::new(Inner::default()),
        }
    }

    /// A second handle on the same entries under a different prefix.
    #[must_use]
    pub fn with_prefix(&self, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            inner: self.inner.clone(),
        }
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.inner.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::StorageIsNotConnected)
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn connect(&self) -> Result<(), Error> {
        self.inner.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Error> {
        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<(), Error> {
        self.ensure_connected()?;
        self.inner
            .entries
            .lock()
            .insert(namespaced(&self.prefix, key), value);
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<Value>, Error> {
        self.ensure_connected()?;
        Ok(self
            .inner
            .entries
            .lock()
            .get(&namespaced(&self.prefix, key))
            .cloned())
    }

    async fn remove_item(&self, key: &str) -> Result<(), Error> {
        self.ensure_connected()?;
        self.inner
            .entries
            .lock()
            .remove(&namespaced(&self.prefix, key));
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.ensure_connected()?;
        let scope = namespaced(&self.prefix, "");
        self.inner
            .entries
            .lock()
            .retain(|key, _| !key.starts_with(&scope));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KeyValueStoreExt;

    #[tokio::test]
    async fn rejects_access_before_connect() {
        let store = MemoryStore::new("t");
        let err = store.set_value("k", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::StorageIsNotConnected));
        assert!(!store.is_connected().await);
    }

    #[tokio::test]
    async fn ping_reports_connected_and_leaves_no_sentinel() {
        let store = MemoryStore::new("t");
        store.connect().await.unwrap();
        assert!(store.is_connected().await);
        assert_eq!(store.inner.entries.lock().len(), 0);
    }

    #[tokio::test]
    async fn typed_items_round_trip() {
        let store = MemoryStore::new("t");
        store.connect().await.unwrap();
        store.set_item("state", "abc").await.unwrap();
        let state: Option<String> = store.get_item("state").await.unwrap();
        assert_eq!(state.as_deref(), Some("abc"));
        assert!(store.has_key("state").await.unwrap());
        store.remove_item("state").await.unwrap();
        assert!(!store.has_key("state").await.unwrap());
    }

    #[tokio::test]
    async fn clear_only_touches_own_prefix() {
        let a = MemoryStore::new("a");
        let b = a.with_prefix("b");
        a.connect().await.unwrap();
        a.set_item("k", &1).await.unwrap();
        b.set_item("k", &2).await.unwrap();

        a.clear().await.unwrap();

        assert!(!a.has_key("k").await.unwrap());
        assert_eq!(b.get_item::<i32>("k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn disconnect_blocks_further_reads() {
        let store = MemoryStore::new("t");
        store.connect().await.unwrap();
        store.disconnect().await.unwrap();
        assert!(matches!(
            store.get_value("k").await,
            Err(Error::StorageIsNotConnected)
        ));
    }
}
