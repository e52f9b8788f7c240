use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::CacheStorage;
use crate::error::Result;
use crate::request::{CacheKey, StoredResponse};

/// On-disk layout of a single cache store.
#[derive(Serialize, Deserialize)]
struct StoreFile {
    name: String,
    created: DateTime<Utc>,
    entries: Vec<StoreEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoreEntry {
    #[serde(flatten)]
    key: CacheKey,
    response: StoredResponse,
}

struct LoadedStore {
    name: String,
    created: DateTime<Utc>,
    entries: BTreeMap<CacheKey, StoredResponse>,
}

impl LoadedStore {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    fn to_file(&self) -> StoreFile {
        StoreFile {
            name: self.name.clone(),
            created: self.created,
            entries: self
                .entries
                .iter()
                .map(|(key, response)| StoreEntry {
                    key: key.clone(),
                    response: response.clone(),
                })
                .collect(),
        }
    }
}

impl From<StoreFile> for LoadedStore {
    fn from(file: StoreFile) -> Self {
        Self {
            name: file.name,
            created: file.created,
            entries: file
                .entries
                .into_iter()
                .map(|e| (e.key, e.response))
                .collect(),
        }
    }
}

/// Cache storage persisted as one JSON file per store.
///
/// All stores are loaded into memory when the directory is opened; every
/// mutation is written through to disk before the call returns.
pub struct DiskCacheStorage {
    dir: PathBuf,
    stores: RwLock<Vec<LoadedStore>>,
}

impl DiskCacheStorage {
    /// Opens (creating if needed) a cache directory and loads its stores.
    ///
    /// Files that cannot be parsed are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or listed.
    pub async fn open_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut stores = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match load_store(&path).await {
                Ok(file) => stores.push(LoadedStore::from(file)),
                Err(e) => log::warn!("Skipping unreadable cache file {}: {e}", path.display()),
            }
        }
        stores.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)));

        log::debug!("Loaded {} cache store(s) from {}", stores.len(), dir.display());
        Ok(Self {
            dir,
            stores: RwLock::new(stores),
        })
    }

    /// Returns the directory backing this storage.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn store_path(&self, name: &str) -> PathBuf {
        let digest = Sha256::digest(name.as_bytes());
        self.dir.join(format!("{digest:x}.json"))
    }

    /// Writes a store atomically (write tmp + rename).
    async fn persist(&self, store: &LoadedStore) -> Result<()> {
        let path = self.store_path(&store.name);
        let tmp_path = path.with_extension("json.tmp");

        let json = serde_json::to_vec(&store.to_file())?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

async fn load_store(path: &Path) -> Result<StoreFile> {
    let contents = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&contents)?)
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut stores = self.stores.write().await;
        if stores.iter().any(|s| s.name == name) {
            return Ok(());
        }
        let store = LoadedStore::new(name);
        self.persist(&store).await?;
        stores.push(store);
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.stores.read().await.iter().any(|s| s.name == name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .map(|s| s.name.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut stores = self.stores.write().await;
        let Some(index) = stores.iter().position(|s| s.name == name) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(self.store_path(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        stores.remove(index);
        Ok(true)
    }

    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, StoredResponse)>) -> Result<()> {
        let mut stores = self.stores.write().await;
        let existing = stores.iter().position(|s| s.name == name);

        // Persist a staged copy first so a failed write leaves memory untouched.
        let mut staged = match existing {
            Some(index) => LoadedStore {
                name: stores[index].name.clone(),
                created: stores[index].created,
                entries: stores[index].entries.clone(),
            },
            None => LoadedStore::new(name),
        };
        staged.entries.extend(entries);
        self.persist(&staged).await?;

        match existing {
            Some(index) => stores[index] = staged,
            None => stores.push(staged),
        }
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
            .find(|s| s.name == name)
            .and_then(|s| s.entries.get(key).cloned()))
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>> {
        Ok(self
            .stores
            .read()
            .await
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}
