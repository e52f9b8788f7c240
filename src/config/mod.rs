//! Configuration types for the proxy, its cache, and its upstream.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Version tag naming the active cache store. Bump on every deploy.
pub const DEFAULT_VERSION: &str = "frank-v2";

/// URLs precached at install time.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/static/index.html",
    "/static/icon-192.png",
    "/static/icon-512.png",
];

/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "OFFLINE_PROXY_PORT";

/// Environment variable overriding the upstream origin.
pub const UPSTREAM_ENV: &str = "OFFLINE_PROXY_UPSTREAM";

/// Cache versioning and precache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the current cache store.
    pub version: String,
    /// Ordered list of URLs fetched and stored on install.
    pub manifest: Vec<String>,
    /// Directory holding persisted cache stores.
    pub dir: PathBuf,
    /// Number of manifest URLs fetched at the same time during install.
    pub concurrent_fetches: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            version: DEFAULT_VERSION.to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(ToString::to_string).collect(),
            dir: data_dir.join("offline-proxy").join("caches"),
            concurrent_fetches: 4,
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the version tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replaces the precache manifest.
    #[must_use]
    pub fn with_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifest = manifest.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the cache directory.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Sets the install fetch concurrency.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, concurrent: usize) -> Self {
        self.concurrent_fetches = concurrent;
        self
    }

    /// Checks that the configuration can drive an install.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty version tag, a manifest entry
    /// that is not an absolute path, or zero install concurrency.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::Config("cache version must not be empty".into()));
        }
        if let Some(bad) = self.manifest.iter().find(|url| !url.starts_with('/')) {
            return Err(Error::Config(format!(
                "manifest entry {bad:?} must be an absolute path"
            )));
        }
        if self.concurrent_fetches == 0 {
            return Err(Error::Config("concurrent_fetches must be at least 1".into()));
        }
        Ok(())
    }
}

/// Origin that live fetches are forwarded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub origin: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000".to_string(),
        }
    }
}

/// Listen address of the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("offline-proxy")
            .join("config.toml")
    }

    /// Loads configuration from `path` (or the default path), then applies
    /// environment overrides.
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting configuration fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(Error::Io(e)),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.cache.validate()?;
        Ok(config)
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is not valid TOML for this schema.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Applies `OFFLINE_PROXY_*` overrides read through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = lookup(PORT_ENV) {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("{PORT_ENV}={port:?} is not a port")))?;
        }
        if let Some(origin) = lookup(UPSTREAM_ENV) {
            self.upstream.origin = origin;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_cache_config() {
        let config = CacheConfig::default();
        assert_eq!(config.version, "frank-v2");
        assert_eq!(
            config.manifest,
            vec![
                "/",
                "/static/index.html",
                "/static/icon-192.png",
                "/static/icon-512.png"
            ]
        );
        assert_eq!(config.concurrent_fetches, 4);
        assert!(config.dir.to_string_lossy().contains("offline-proxy"));
    }

    #[test]
    fn cache_config_builder_pattern() {
        let config = CacheConfig::new()
            .with_version("frank-v3")
            .with_manifest(["/a", "/b"])
            .with_dir("/tmp/caches")
            .with_concurrent_fetches(1);

        assert_eq!(config.version, "frank-v3");
        assert_eq!(config.manifest, vec!["/a", "/b"]);
        assert_eq!(config.dir, PathBuf::from("/tmp/caches"));
        assert_eq!(config.concurrent_fetches, 1);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(CacheConfig::new().validate().is_ok());
        assert!(CacheConfig::new().with_version("  ").validate().is_err());
        assert!(
            CacheConfig::new()
                .with_manifest(["static/index.html"])
                .validate()
                .is_err()
        );
        assert!(CacheConfig::new().with_concurrent_fetches(0).validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [cache]
            version = "frank-v3"

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.version, "frank-v3");
        assert_eq!(config.cache.manifest.len(), 4);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.upstream, UpstreamConfig::default());
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("cache = 3").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn app_config_serializes_to_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let back = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env(|key| match key {
                PORT_ENV => Some("9999".into()),
                UPSTREAM_ENV => Some("http://10.0.0.2:8000".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.upstream.origin, "http://10.0.0.2:8000");
    }

    #[test]
    fn env_port_must_parse() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|key| (key == PORT_ENV).then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[cache]\nversion = \"frank-v9\"\nmanifest = [\"/\"]\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cache.version, "frank-v9");
        assert_eq!(config.cache.manifest, vec!["/"]);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.cache.version, DEFAULT_VERSION);
    }

    #[test]
    fn load_rejects_invalid_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\nmanifest = [\"relative.png\"]\n").unwrap();
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(Error::Config(_))
        ));
    }
}
