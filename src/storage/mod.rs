//! Cache storage abstraction: a registry of named cache stores.
//!
//! Each store maps a [`CacheKey`] to a [`StoredResponse`]. The proxy never
//! touches a global cache namespace directly; it is handed a
//! [`CacheStorage`] so tests can run against [`MemoryCacheStorage`].

mod disk;
mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{CacheKey, StoredResponse};

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

/// Registry of named cache stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Creates the named store if it does not exist yet.
    async fn open(&self, name: &str) -> Result<()>;

    /// Returns true if the named store exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Lists store names in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Deletes the named store. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Writes all entries into the named store in one step, creating the
    /// store if needed. Existing entries with the same key are replaced.
    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, StoredResponse)>) -> Result<()>;

    /// Looks up a request in the named store.
    ///
    /// Returns `None` for a missing store, a missing entry, or a key that is
    /// not cacheable.
    async fn match_request(&self, name: &str, key: &CacheKey) -> Result<Option<StoredResponse>>;

    /// Lists the keys held by the named store, sorted. Empty if the store is missing.
    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>>;
}
