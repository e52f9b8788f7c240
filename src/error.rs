//! Error types for the offline-proxy library.

use thiserror::Error;

/// Errors that can occur while installing, activating, or serving fetches.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client error (connection refused, DNS failure, body read abort).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Network fetch rejected for a reason not reported by the HTTP client.
    #[error("Network error: {0}")]
    Network(String),

    /// A precache response arrived with a non-success status.
    #[error("Unexpected status {status} for {url}")]
    BadStatus {
        /// URL that was fetched.
        url: String,
        /// HTTP status returned by the upstream.
        status: u16,
    },

    /// Neither the network nor the cache store could produce a response.
    #[error("No network or cached response for {url}")]
    NotFound {
        /// URL of the request that could not be served.
        url: String,
    },

    /// A lifecycle operation was attempted from a state that does not allow it.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was rejected.
        operation: &'static str,
        /// Lifecycle state at the time of the call.
        state: String,
    },

    /// The request could not be turned into an upstream request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error during cache persistence.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache store file could not be encoded or decoded.
    #[error("Cache encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error counts as the network rejecting the
    /// request, which makes the cache eligible as a fallback.
    #[must_use]
    pub const fn is_network_failure(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Network(_))
    }
}

/// A specialized `Result` type for offline-proxy operations.
pub type Result<T> = std::result::Result<T, Error>;
