use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheStorage;
use crate::error::Result;
use crate::request::{CacheKey, StoredResponse};

type Store = BTreeMap<CacheKey, StoredResponse>;

/// In-memory cache storage, used for tests and for running without a cache directory.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    // Vec keeps creation order for `keys()`.
    stores: RwLock<Vec<(String, Store)>>,
}

impl MemoryCacheStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut stores = self.stores.write().await;
        if !stores.iter().any(|(n, _)| n == name) {
            stores.push((name.to_string(), Store::new()));
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.stores.read().await.iter().any(|(n, _)| n == name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .map(|(n, _)| n.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|(n, _)| n != name);
        Ok(stores.len() != before)
    }

    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, StoredResponse)>) -> Result<()> {
        let mut stores = self.stores.write().await;
        let index = match stores.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                stores.push((name.to_string(), Store::new()));
                stores.len() - 1
            }
        };
        stores[index].1.extend(entries);
        Ok(())
    }

    async fn match_request(&self, name: &str, key: &CacheKey) -> Result<Option<StoredResponse>> {
        if !key.is_cacheable() {
            return Ok(None);
        }
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, store)| store.get(key).cloned()))
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, store)| store.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_is_idempotent_and_ordered() {
        let storage = MemoryCacheStorage::new();
        storage.open("frank-v1").await.unwrap();
        storage.open("frank-v2").await.unwrap();
        storage.open("frank-v1").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["frank-v1", "frank-v2"]);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let storage = MemoryCacheStorage::new();
        storage.open("frank-v1").await.unwrap();
        assert!(storage.delete("frank-v1").await.unwrap());
        assert!(!storage.delete("frank-v1").await.unwrap());
        assert!(!storage.has("frank-v1").await.unwrap());
    }

    #[tokio::test]
    async fn put_all_replaces_same_key() {
        let storage = MemoryCacheStorage::new();
        storage
            .put_all("v", vec![(CacheKey::get("/"), StoredResponse::new(200, "old"))])
            .await
            .unwrap();
        storage
            .put_all("v", vec![(CacheKey::get("/"), StoredResponse::new(200, "new"))])
            .await
            .unwrap();

        assert_eq!(storage.entries("v").await.unwrap(), vec![CacheKey::get("/")]);
        let hit = storage.match_request("v", &CacheKey::get("/")).await.unwrap();
        assert_eq!(hit.unwrap().body.as_ref(), b"new");
    }

    #[tokio::test]
    async fn match_ignores_non_get_and_missing_store() {
        let storage = MemoryCacheStorage::new();
        storage
            .put_all("v", vec![(CacheKey::get("/"), StoredResponse::new(200, "x"))])
            .await
            .unwrap();

        let post = CacheKey {
            method: "POST".into(),
            url: "/".into(),
        };
        assert!(storage.match_request("v", &post).await.unwrap().is_none());
        assert!(
            storage
                .match_request("other", &CacheKey::get("/"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(storage.entries("other").await.unwrap().is_empty());
    }
}
