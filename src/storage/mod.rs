//! Key/value storage the authentication flow checkpoints into.
//!
//! The store is the only thing shared between the delegate that starts a flow
//! and the one that finishes it after a redirect, so every implementation must
//! be durable for at least as long as the navigation takes.
//!
//! ```rust,ignore
//! use chainauth::storage::{KeyValueStore, KeyValueStoreExt, MemoryStore};
//!
//! let store = MemoryStore::new("chainauth");
//! store.connect().await?;
//! store.set_item("state", &"abc").await?;
//! let state: Option<String> = store.get_item("state").await?;
//! ```

mod file;
mod memory;

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

const PING_KEY: &str = "__chainauth_ping__";
const PING_VALUE: &str = "pong";

/// Prefixed key/value storage with an explicit connect/disconnect lifecycle.
///
/// Every data method fails with [`Error::StorageIsNotConnected`] until
/// [`connect`](KeyValueStore::connect) has succeeded.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Namespace prepended to every key.
    fn prefix(&self) -> &str;

    async fn connect(&self) -> Result<(), Error>;

    async fn disconnect(&self) -> Result<(), Error>;

    async fn set_value(&self, key: &str, value: Value) -> Result<(), Error>;

    async fn get_value(&self, key: &str) -> Result<Option<Value>, Error>;

    async fn remove_item(&self, key: &str) -> Result<(), Error>;

    /// Remove every key under this store's prefix.
    async fn clear(&self) -> Result<(), Error>;

    async fn has_key(&self, key: &str) -> Result<bool, Error> {
        Ok(self.get_value(key).await?.is_some())
    }

    /// Write, read back and delete a sentinel key.
    async fn is_connected(&self) -> bool {
        let sentinel = Value::String(PING_VALUE.to_string());
        if self.set_value(PING_KEY, sentinel.clone()).await.is_err() {
            return false;
        }
        let read = self.get_value(PING_KEY).await;
        let removed = self.remove_item(PING_KEY).await;
        matches!(read, Ok(Some(ref value)) if *value == sentinel) && removed.is_ok()
    }
}

/// Typed access on top of [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    fn set_item<T>(&self, key: &str, value: &T) -> impl Future<Output = Result<(), Error>> + Send
    where
        T: Serialize + ?Sized + Sync;

    fn get_item<T>(&self, key: &str) -> impl Future<Output = Result<Option<T>, Error>> + Send
    where
        T: DeserializeOwned + Send;
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {
    fn set_item<T>(&self, key: &str, value: &T) -> impl Future<Output = Result<(), Error>> + Send
    where
        T: Serialize + ?Sized + Sync,
    {
        let encoded = serde_json::to_value(value);
        async move { self.set_value(key, encoded?).await }
    }

    fn get_item<T>(&self, key: &str) -> impl Future<Output = Result<Option<T>, Error>> + Send
    where
        T: DeserializeOwned + Send,
    {
        async move {
            match self.get_value(key).await? {
                Some(value) => Ok(Some(serde_json::from_value(value)?)),
                None => Ok(None),
            }
        }
    }
}

pub(crate) fn namespaced(prefix: &str, key: &str) -> String {
    format!("{prefix}:{key}")
}
