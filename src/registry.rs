//! Name → implementation lookup for resolvers and communicators.
//!
//! New providers or respond strategies are added by registering them here;
//! the delegate never needs to change.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::communicator::OriginFrameCommunicator;
use crate::resolver::IdentityResolver;

pub struct Registry<T: ?Sized> {
    entries: BTreeMap<String, Arc<T>>,
}

/// `provider` value → identity resolver.
pub type ResolverRegistry = Registry<dyn IdentityResolver>;

/// `respond_strategy` value → communicator.
pub type CommunicatorRegistry = Registry<dyn OriginFrameCommunicator>;

impl<T: ?Sized> Registry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register under `name`, returning whatever was registered there before.
    pub fn register(&mut self, name: impl Into<String>, entry: Arc<T>) -> Option<Arc<T>> {
        self.entries.insert(name.into(), entry)
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, entry: Arc<T>) -> Self {
        self.register(name, entry);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual Clone: derive would require `T: Clone`.
impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communicator::PostMessageCommunicator;

    #[test]
    fn later_registration_replaces_earlier() {
        let (first, _inbox1) = PostMessageCommunicator::new();
        let (second, _inbox2) = PostMessageCommunicator::new();
        let first: Arc<dyn OriginFrameCommunicator> = Arc::new(first);
        let second: Arc<dyn OriginFrameCommunicator> = Arc::new(second);

        let mut registry = CommunicatorRegistry::new().with("web", first.clone());
        let replaced = registry.register("web", second.clone()).unwrap();

        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(Arc::ptr_eq(&registry.get("web").unwrap(), &second));
        assert!(registry.get("popup").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["web"]);
    }
}
