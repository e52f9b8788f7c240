//! Request and response types shared by the cache store and the network.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Returns true if the header must be dropped when proxying.
#[must_use]
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Identity of a cached request: method plus URL, fragment removed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: String,
    pub url: String,
}

impl CacheKey {
    /// Builds a `GET` key for a URL.
    #[must_use]
    pub fn get(url: &str) -> Self {
        Self {
            method: "GET".to_string(),
            url: strip_fragment(url).to_string(),
        }
    }

    /// Only `GET` requests can be stored or matched.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }
}

fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(before, _)| before)
}

/// An intercepted request on its way to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    /// Upper-case HTTP method.
    pub method: String,
    /// Path and query, relative to the upstream origin.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ProxyRequest {
    /// Creates a bodiless `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a request with an arbitrary method.
    #[must_use]
    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            ..Self::get(url)
        }
    }

    /// Adds a header, skipping hop-by-hop headers.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if !is_hop_by_hop(name) {
            self.headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the cache identity of this request.
    #[must_use]
    pub fn key(&self) -> CacheKey {
        CacheKey {
            method: self.method.clone(),
            url: strip_fragment(&self.url).to_string(),
        }
    }
}

/// A response as returned by the network or read back from a cache store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Bytes,
}

impl StoredResponse {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns the first header value matching `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

mod body_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
