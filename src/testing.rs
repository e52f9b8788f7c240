//! Test doubles shared by unit tests across modules.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::config::{CacheConfig, DEFAULT_MANIFEST};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{CacheKey, ProxyRequest, StoredResponse};
use crate::storage::{CacheStorage, MemoryCacheStorage};

/// Scriptable network: serves canned responses, can go offline, and can
/// reject individual URLs.
#[derive(Default)]
pub struct FakeNetwork {
    responses: Mutex<HashMap<String, StoredResponse>>,
    rejected: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network serving `"<url> v<n>"` bodies for every default manifest URL.
    pub fn serving_manifest(generation: u32) -> Self {
        let network = Self::new();
        for url in DEFAULT_MANIFEST {
            network.serve(url, StoredResponse::new(200, format!("{url} v{generation}")));
        }
        network
    }

    pub fn serve(&self, url: &str, response: StoredResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn reject(&self, url: &str) {
        self.rejected.lock().unwrap().insert(url.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<StoredResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !request.url.starts_with('/') || request.url.starts_with("//") {
            return Err(Error::InvalidRequest(format!(
                "{}: not an origin-relative path",
                request.url
            )));
        }
        if self.offline.load(Ordering::SeqCst) || self.rejected.lock().unwrap().contains(&request.url)
        {
            return Err(Error::Network(format!("failed to fetch {}", request.url)));
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| StoredResponse::new(404, "not found")))
    }
}

/// In-memory storage whose deletes fail while `fail_deletes` is set.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryCacheStorage,
    fail_deletes: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("cannot delete {name}"),
            )));
        }
        self.inner.delete(name).await
    }

    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, StoredResponse)>) -> Result<()> {
        self.inner.put_all(name, entries).await
    }

    async fn match_request(&self, name: &str, key: &CacheKey) -> Result<Option<StoredResponse>> {
        self.inner.match_request(name, key).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>> {
        self.inner.entries(name).await
    }
}

/// Cache config with the default version and manifest and a throwaway directory.
pub fn cache_config() -> CacheConfig {
    CacheConfig::new().with_dir(std::env::temp_dir().join("offline-proxy-unused"))
}
