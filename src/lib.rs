//! offline-proxy - a network-first reverse proxy with versioned offline caches.
//!
//! Every request is forwarded to the upstream origin first. When the network
//! rejects, the response stored in the current cache store is served
//! instead. Cache stores are named by a version tag: installing a version
//! precaches its manifest, and activating it deletes every other store.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use offline_proxy::{CacheConfig, DiskCacheStorage, HttpNetwork, OfflineProxy, ProxyRequest};
//!
//! # async fn example() -> offline_proxy::Result<()> {
//! let config = CacheConfig::default();
//! let storage = DiskCacheStorage::open_dir(&config.dir).await?;
//! let network = HttpNetwork::new("http://127.0.0.1:8000")?;
//! let proxy = Arc::new(OfflineProxy::new(config, storage, network));
//!
//! proxy.install().await?;
//! proxy.activate().await?;
//!
//! let response = proxy.handle_fetch(&ProxyRequest::get("/")).await?;
//! println!("{} ({} bytes)", response.status, response.body.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod request;
pub mod server;
pub mod stats;
pub mod storage;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{AppConfig, CacheConfig, ServerConfig, UpstreamConfig};
pub use error::{Error, Result};
pub use events::{Dispatcher, Event, EventKind, EventOutcome};
pub use network::{HttpNetwork, Network};
pub use request::{CacheKey, ProxyRequest, StoredResponse};
pub use stats::{FetchStats, FetchStatsSnapshot, InstallReport};
pub use storage::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use worker::{OfflineProxy, WorkerState};
