//! The offline cache proxy: precache on install, purge on activate,
//! network-first with cache fallback on fetch.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::{StreamExt, TryStreamExt, stream};
use tokio::sync::watch;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::network::{HttpNetwork, Network};
use crate::request::{CacheKey, ProxyRequest, StoredResponse};
use crate::stats::{FetchSource, FetchStats, InstallReport};
use crate::storage::{CacheStorage, DiskCacheStorage};

/// Lifecycle of one cache version.
///
/// `Parsed → Installing → Installed → Activating → Activated`. A failed
/// install moves to `Redundant`, from which install may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting for activation.
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offline cache proxy bound to one cache version.
pub struct OfflineProxy<S: CacheStorage = DiskCacheStorage, N: Network = HttpNetwork> {
    config: CacheConfig,
    storage: S,
    network: N,
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
    stats: FetchStats,
}

impl<S: CacheStorage, N: Network> OfflineProxy<S, N> {
    /// Creates a proxy for `config.version` over the given storage and network.
    #[must_use]
    pub fn new(config: CacheConfig, storage: S, network: N) -> Self {
        Self {
            config,
            storage,
            network,
            state: watch::Sender::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            stats: FetchStats::new(),
        }
    }

    /// Returns the current version tag.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.config.version
    }

    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub const fn network(&self) -> &N {
        &self.network
    }

    #[must_use]
    pub const fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Requests activation as soon as install completes, without waiting
    /// for earlier clients to go away.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    /// Returns true once [`skip_waiting`](Self::skip_waiting) has been requested.
    #[must_use]
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Atomically moves from one of `allowed` to `next`.
    fn transition(
        &self,
        operation: &'static str,
        allowed: &[WorkerState],
        next: WorkerState,
    ) -> Result<()> {
        let mut rejected = None;
        self.state.send_if_modified(|state| {
            if allowed.contains(state) {
                *state = next;
                true
            } else {
                rejected = Some(*state);
                false
            }
        });
        match rejected {
            Some(state) => Err(Error::InvalidState {
                operation,
                state: state.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }

    /// Opens the current cache store and fills it with every manifest URL.
    ///
    /// Entries are written only after every manifest fetch has succeeded
    /// with a 2xx status. On failure the (possibly empty) store is left in
    /// place for the next attempt and the state becomes `Redundant`.
    ///
    /// # Errors
    ///
    /// Returns the first fetch, status, or storage error encountered, or
    /// [`Error::InvalidState`] if an install or activation is in progress.
    pub async fn install(&self) -> Result<InstallReport> {
        self.transition(
            "install",
            &[
                WorkerState::Parsed,
                WorkerState::Redundant,
                WorkerState::Installed,
                WorkerState::Activated,
            ],
            WorkerState::Installing,
        )?;
        self.skip_waiting();

        log::info!(
            "Installing cache {} ({} URLs)",
            self.config.version,
            self.config.manifest.len()
        );
        match self.precache().await {
            Ok(report) => {
                self.set_state(WorkerState::Installed);
                log::info!(
                    "Installed cache {}: {} entries, {} bytes in {:?}",
                    report.version,
                    report.entries,
                    report.bytes,
                    report.elapsed
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                log::error!("Install of cache {} failed: {e}", self.config.version);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<InstallReport> {
        let start = Instant::now();
        let version = self.config.version.as_str();
        self.storage.open(version).await?;

        let responses: Vec<(CacheKey, StoredResponse)> =
            stream::iter(self.config.manifest.iter().cloned())
                .map(|url| async move {
                    let request = ProxyRequest::get(url.as_str());
                    let response = self.network.fetch(&request).await.map_err(|e| {
                        log::warn!("Precache fetch of {url} failed: {e}");
                        e
                    })?;
                    if !response.is_success() {
                        return Err(Error::BadStatus {
                            url,
                            status: response.status,
                        });
                    }
                    Ok((request.key(), response))
                })
                .buffered(self.config.concurrent_fetches.max(1))
                .try_collect()
                .await?;

        let entries = responses.len();
        let bytes = responses.iter().map(|(_, r)| r.body.len() as u64).sum();
        self.storage.put_all(version, responses).await?;

        Ok(InstallReport {
            version: version.to_string(),
            entries,
            bytes,
            elapsed: start.elapsed(),
        })
    }

    /// Deletes every cache store whose name is not the current version.
    ///
    /// Returns the names that were deleted. Deletion is not rolled back if
    /// a later delete fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the proxy is installed (or
    /// already active), or the first storage error hit while purging.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let previous = self.state();
        self.transition(
            "activate",
            &[WorkerState::Installed, WorkerState::Activated],
            WorkerState::Activating,
        )?;

        match self.purge_stale().await {
            Ok(deleted) => {
                self.set_state(WorkerState::Activated);
                log::info!("Cache {} is active", self.config.version);
                Ok(deleted)
            }
            Err(e) => {
                self.set_state(previous);
                log::error!("Activation of cache {} failed: {e}", self.config.version);
                Err(e)
            }
        }
    }

    async fn purge_stale(&self) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| *name != self.config.version)
            .collect();

        futures::future::try_join_all(stale.iter().map(|name| async move {
            self.storage.delete(name).await?;
            log::info!("Deleted stale cache {name}");
            Ok::<_, Error>(())
        }))
        .await?;

        Ok(stale)
    }

    /// Serves a request network-first, falling back to the current cache store.
    ///
    /// A network response is returned as-is whatever its status. Only a
    /// rejected fetch consults the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the network rejects and the cache
    /// has no entry, [`Error::InvalidRequest`] unchanged, or a storage error
    /// if the lookup itself fails.
    pub async fn handle_fetch(&self, request: &ProxyRequest) -> Result<StoredResponse> {
        let network_err = match self.network.fetch(request).await {
            Ok(response) => {
                self.stats.record(FetchSource::Network);
                return Ok(response);
            }
            // A malformed request is the caller's fault, not a network rejection.
            Err(e @ Error::InvalidRequest(_)) => return Err(e),
            Err(e) => e,
        };

        log::debug!(
            "Network failed for {} {}: {network_err}; trying cache {}",
            request.method,
            request.url,
            self.config.version
        );
        if let Some(cached) = self
            .storage
            .match_request(&self.config.version, &request.key())
            .await?
        {
            self.stats.record(FetchSource::Cache);
            return Ok(cached);
        }

        self.stats.record_miss();
        log::warn!("No cached response for {} {}", request.method, request.url);
        Err(Error::NotFound {
            url: request.url.clone(),
        })
    }

    /// Forwards a request to the network without cache fallback, for use
    /// before the proxy has taken control.
    ///
    /// # Errors
    ///
    /// Returns the network error unchanged.
    pub async fn passthrough(&self, request: &ProxyRequest) -> Result<StoredResponse> {
        self.network.fetch(request).await
    }
}
