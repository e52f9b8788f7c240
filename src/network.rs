//! Live network access for intercepted requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::request::{ProxyRequest, StoredResponse, is_hop_by_hop};

/// Fetches a request from the network.
///
/// An `Err` means the fetch *rejected* (connection refused, DNS failure,
/// aborted body). An HTTP error status is still an `Ok` response.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> Result<StoredResponse>;
}

/// Builds the HTTP client used for upstream requests.
fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// [`Network`] implementation forwarding to an upstream origin over HTTP.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: Url,
}

impl HttpNetwork {
    /// Creates a network client for `origin` (e.g. `http://127.0.0.1:8000`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the origin is not an absolute URL, or an
    /// HTTP error if the client cannot be built.
    pub fn new(origin: &str) -> Result<Self> {
        let origin =
            Url::parse(origin).map_err(|e| Error::Config(format!("upstream {origin:?}: {e}")))?;
        if origin.cannot_be_a_base() {
            return Err(Error::Config(format!("upstream {origin} cannot be a base URL")));
        }
        Ok(Self {
            client: build_http_client()?,
            origin,
        })
    }

    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// Maps an origin-relative request target onto the upstream origin.
    ///
    /// Only `/path?query` targets are accepted. Anything else, including
    /// scheme-relative `//host/...` targets, could leave the origin.
    fn resolve(&self, target: &str) -> Result<Url> {
        if !target.starts_with('/') || target.starts_with("//") {
            return Err(Error::InvalidRequest(format!(
                "{target}: not an origin-relative path"
            )));
        }
        let target = target.split_once('#').map_or(target, |(t, _)| t);
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        let mut url = self.origin.clone();
        let prefix = self.origin.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}{path}"));
        url.set_query(query);
        url.set_fragment(None);
        Ok(url)
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<StoredResponse> {
        let url = self.resolve(&request.url)?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidRequest(format!("{}: {e}", request.method)))?;

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .map(|(name, value)| {
                let value = value.to_str().map_or_else(
                    |_| {
                        log::debug!(
                            "Header {name} of {} is not UTF-8, decoding lossily",
                            request.url
                        );
                        String::from_utf8_lossy(value.as_bytes()).into_owned()
                    },
                    str::to_string,
                );
                (name.as_str().to_string(), value)
            })
            .collect();
        let body = response.bytes().await?;

        log::debug!("{} {} -> {status}", request.method, request.url);
        Ok(StoredResponse {
            status,
            headers,
            body,
        })
    }
}
