//! HTTP reverse proxy hosting an [`OfflineProxy`].
//!
//! The server plays the part of the host runtime: it delivers `install` and
//! `activate` on start, then turns every incoming request into a `fetch`
//! event. Until activation succeeds, requests go straight to the network
//! and each one retries the lifecycle first.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{Error, Result};
use crate::events::{Dispatcher, Event, EventOutcome};
use crate::network::Network;
use crate::request::{ProxyRequest, StoredResponse, is_hop_by_hop};
use crate::stats::FetchStatsSnapshot;
use crate::storage::CacheStorage;
use crate::worker::{OfflineProxy, WorkerState};

/// Route reporting the proxy's own status instead of being proxied.
pub const STATUS_PATH: &str = "/__offline-proxy/status";

/// Default largest request body forwarded upstream. Larger bodies get `413`.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared state of the HTTP host.
pub struct ProxyState<S: CacheStorage, N: Network> {
    proxy: Arc<OfflineProxy<S, N>>,
    dispatcher: Dispatcher,
    lifecycle: Arc<Mutex<()>>,
    body_limit: usize,
}

impl<S: CacheStorage, N: Network> Clone for ProxyState<S, N> {
    fn clone(&self) -> Self {
        Self {
            proxy: Arc::clone(&self.proxy),
            dispatcher: self.dispatcher.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            body_limit: self.body_limit,
        }
    }
}

impl<S, N> ProxyState<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    #[must_use]
    pub fn new(proxy: Arc<OfflineProxy<S, N>>) -> Self {
        let dispatcher = proxy.dispatcher();
        Self {
            proxy,
            dispatcher,
            lifecycle: Arc::new(Mutex::new(())),
            body_limit: MAX_BODY_BYTES,
        }
    }

    /// Sets the largest request body accepted for proxying.
    #[must_use]
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    #[must_use]
    pub const fn proxy(&self) -> &Arc<OfflineProxy<S, N>> {
        &self.proxy
    }

    /// Runs install, then activate if skip-waiting was requested.
    ///
    /// # Errors
    ///
    /// Returns the install or activation error.
    pub async fn start(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.run_lifecycle().await
    }

    async fn run_lifecycle(&self) -> Result<()> {
        if self.proxy.state() != WorkerState::Installed {
            self.dispatcher.dispatch(Event::Install).await?;
        }
        if self.proxy.skip_waiting_requested() {
            self.dispatcher.dispatch(Event::Activate).await?;
        } else {
            log::info!("Cache {} installed, waiting", self.proxy.version());
        }
        Ok(())
    }

    /// Returns true if the proxy controls requests, retrying the lifecycle
    /// once if it does not. Concurrent callers skip the retry while one is running.
    async fn ensure_active(&self) -> bool {
        if self.proxy.state() == WorkerState::Activated {
            return true;
        }
        let Ok(_guard) = self.lifecycle.try_lock() else {
            return false;
        };
        if self.proxy.state() == WorkerState::Activated {
            return true;
        }
        match self.run_lifecycle().await {
            Ok(()) => self.proxy.state() == WorkerState::Activated,
            Err(e) => {
                log::debug!("Lifecycle retry failed: {e}");
                false
            }
        }
    }

    /// Builds the axum router: the status route plus a catch-all proxy.
    pub fn router(self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let body_limit = DefaultBodyLimit::max(self.body_limit);

        Router::new()
            .route(STATUS_PATH, get(status::<S, N>).layer(cors))
            .fallback(proxy_fetch::<S, N>)
            .layer(body_limit)
            .with_state(self)
    }
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    state: &'static str,
    caches: Vec<String>,
    fetches: FetchStatsSnapshot,
}

async fn status<S, N>(State(state): State<ProxyState<S, N>>) -> Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let proxy = &state.proxy;
    match proxy.storage().keys().await {
        Ok(caches) => axum::Json(StatusResponse {
            version: proxy.version().to_string(),
            state: proxy.state().as_str(),
            caches,
            fetches: proxy.stats().snapshot(),
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// The `Bytes` extractor enforces `DefaultBodyLimit` and answers `413` itself.
async fn proxy_fetch<S, N>(
    State(state): State<ProxyState<S, N>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let request = to_proxy_request(&method, &uri, &headers, body);

    let result = if state.ensure_active().await {
        match state.dispatcher.dispatch(Event::Fetch(request)).await {
            Ok(EventOutcome::Response(response)) => Ok(response),
            Ok(other) => Err(Error::InvalidState {
                operation: "respond",
                state: format!("fetch handler returned {other:?}"),
            }),
            Err(e) => Err(e),
        }
    } else {
        state.proxy.passthrough(&request).await
    };

    match result {
        Ok(response) => to_response(response),
        Err(e) => error_response(&e),
    }
}

fn to_proxy_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> ProxyRequest {
    let url = uri.path_and_query().map_or("/", |pq| pq.as_str());

    let mut proxied = ProxyRequest::new(method.as_str(), url).with_body(body);
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        proxied = proxied.with_header(name.as_str(), &value);
    }
    proxied
}

fn to_response(stored: StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &stored.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    match builder.body(Body::from(stored.body)) {
        Ok(response) => response,
        Err(e) => error_response(&Error::InvalidRequest(format!("bad upstream response: {e}"))),
    }
}

/// Maps an error to the status the page sees.
fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::NotFound { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        e if e.is_network_failure() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &Error) -> Response {
    (error_status(error), format!("{error}\n")).into_response()
}

/// Binds `host:port`, runs the lifecycle, and serves until Ctrl-C.
///
/// A failed install does not stop the server; it keeps retrying on each request.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve<S, N>(proxy: Arc<OfflineProxy<S, N>>, host: &str, port: u16) -> Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let state = ProxyState::new(proxy);
    if let Err(e) = state.start().await {
        log::warn!("Proxy not in control yet, will retry on next request: {e}");
    }

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    log::info!("Serving on http://{}", listener.local_addr()?);

    axum::serve(listener, state.router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await?;
    Ok(())
}
