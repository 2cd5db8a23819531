//! In-memory cache store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheStore, ensure_cacheable};
use crate::error::Result;
use crate::key::RequestKey;
use crate::response::CachedResponse;

type Namespace = BTreeMap<RequestKey, CachedResponse>;

/// A cache store that keeps every namespace in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: RwLock<BTreeMap<String, Namespace>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in a namespace (0 if it does not exist).
    pub async fn entry_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, namespace: &str) -> Result<()> {
        self.namespaces
            .write()
            .await
            .entry(namespace.to_string())
            .or_default();
        Ok(())
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.write().await.remove(namespace).is_some())
    }

    async fn has(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.read().await.contains_key(namespace))
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        Ok(self.namespaces.read().await.keys().cloned().collect())
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<RequestKey>> {
        Ok(self
            .namespaces
            .read()
            .await
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, namespace: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
        Ok(self
            .namespaces
            .read()
            .await
            .get(namespace)
            .and_then(|ns| ns.get(key).cloned()))
    }

    async fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &CachedResponse,
    ) -> Result<()> {
        ensure_cacheable(key)?;
        self.namespaces
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(key.clone(), response.clone());
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &RequestKey) -> Result<bool> {
        Ok(self
            .namespaces
            .write()
            .await
            .get_mut(namespace)
            .is_some_and(|ns| ns.remove(key).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> RequestKey {
        RequestKey::parse("GET", &format!("https://app.example.com/{path}")).unwrap()
    }

    #[tokio::test]
    async fn open_creates_empty_namespace() {
        let store = MemoryStore::new();
        assert!(!store.has("c").await.unwrap());
        store.open("c").await.unwrap();
        assert!(store.has("c").await.unwrap());
        assert!(store.keys("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_get_remove() {
        let store = MemoryStore::new();
        store.put("c", &key("a.js"), &CachedResponse::ok("a")).await.unwrap();
        assert_eq!(store.entry_count("c").await, 1);
        assert_eq!(
            store.get("c", &key("a.js")).await.unwrap(),
            Some(CachedResponse::ok("a"))
        );
        assert!(store.remove("c", &key("a.js")).await.unwrap());
        assert!(!store.remove("c", &key("a.js")).await.unwrap());
        assert_eq!(store.get("c", &key("a.js")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = MemoryStore::new();
        store.open("c").await.unwrap();
        assert!(store.delete("c").await.unwrap());
        assert!(!store.delete("c").await.unwrap());
        assert!(store.namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_non_get() {
        let store = MemoryStore::new();
        let post = RequestKey::parse("POST", "https://app.example.com/api").unwrap();
        assert!(store.put("c", &post, &CachedResponse::ok("")).await.is_err());
        assert!(!store.has("c").await.unwrap());
    }
}
