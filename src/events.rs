//! Event dispatch: handlers keyed by event kind, each returning the work the
//! host must await before the event counts as complete.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{ProxyRequest, StoredResponse};
use crate::stats::InstallReport;
use crate::storage::CacheStorage;
use crate::worker::OfflineProxy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch => "fetch",
        })
    }
}

/// An event delivered by the host.
#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(ProxyRequest),
}

impl Event {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Install => EventKind::Install,
            Self::Activate => EventKind::Activate,
            Self::Fetch(_) => EventKind::Fetch,
        }
    }
}

/// Result of a completed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Installed(InstallReport),
    /// Activation finished; carries the names of the deleted stores.
    Activated(Vec<String>),
    Response(StoredResponse),
}

type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<EventOutcome>> + Send + Sync>;

/// Dispatch table mapping each event kind to its handler.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Handler>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any earlier handler.
    pub fn register<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(Event) -> BoxFuture<'static, Result<EventOutcome>> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
    }

    #[must_use]
    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Delivers an event and waits for the work its handler registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if no handler is registered for the
    /// event kind, otherwise whatever the handler's work returns.
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
        let kind = event.kind();
        let Some(handler) = self.handlers.get(&kind) else {
            return Err(Error::InvalidState {
                operation: "dispatch",
                state: format!("no {kind} handler registered"),
            });
        };
        handler(event).await
    }
}

impl<S, N> OfflineProxy<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    /// Builds a dispatcher with this proxy's install, activate, and fetch handlers.
    #[must_use]
    pub fn dispatcher(self: &Arc<Self>) -> Dispatcher {
        let mut dispatcher = Dispatcher::new();

        let proxy = Arc::clone(self);
        dispatcher.register(EventKind::Install, move |_| {
            let proxy = Arc::clone(&proxy);
            async move { proxy.install().await.map(EventOutcome::Installed) }.boxed()
        });

        let proxy = Arc::clone(self);
        dispatcher.register(EventKind::Activate, move |_| {
            let proxy = Arc::clone(&proxy);
            async move { proxy.activate().await.map(EventOutcome::Activated) }.boxed()
        });

        let proxy = Arc::clone(self);
        dispatcher.register(EventKind::Fetch, move |event| {
            let proxy = Arc::clone(&proxy);
            async move {
                match event {
                    Event::Fetch(request) => proxy
                        .handle_fetch(&request)
                        .await
                        .map(EventOutcome::Response),
                    other => Err(Error::InvalidState {
                        operation: "fetch",
                        state: format!("received {} event", other.kind()),
                    }),
                }
            }
            .boxed()
        });

        dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCacheStorage;
    use crate::testing::{FakeNetwork, cache_config};
    use crate::worker::WorkerState;

    fn proxy() -> Arc<OfflineProxy<MemoryCacheStorage, FakeNetwork>> {
        Arc::new(OfflineProxy::new(
            cache_config(),
            MemoryCacheStorage::new(),
            FakeNetwork::serving_manifest(1),
        ))
    }

    #[tokio::test]
    async fn empty_dispatcher_rejects_events() {
        let dispatcher = Dispatcher::new();
        assert!(!dispatcher.handles(EventKind::Install));
        let err = dispatcher.dispatch(Event::Install).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { operation: "dispatch", .. }));
    }

    #[tokio::test]
    async fn custom_handler_is_awaited() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EventKind::Fetch, |event| {
            async move {
                match event {
                    Event::Fetch(request) => {
                        Ok(EventOutcome::Response(StoredResponse::new(200, request.url)))
                    }
                    _ => Ok(EventOutcome::Activated(Vec::new())),
                }
            }
            .boxed()
        });

        let outcome = dispatcher
            .dispatch(Event::Fetch(ProxyRequest::get("/hello")))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Response(StoredResponse::new(200, "/hello")));
    }

    #[tokio::test]
    async fn full_lifecycle_through_dispatcher() {
        let proxy = proxy();
        proxy.storage().open("frank-v1").await.unwrap();
        let dispatcher = proxy.dispatcher();

        let installed = dispatcher.dispatch(Event::Install).await.unwrap();
        assert!(matches!(installed, EventOutcome::Installed(ref r) if r.entries == 4));
        assert_eq!(proxy.state(), WorkerState::Installed);

        let activated = dispatcher.dispatch(Event::Activate).await.unwrap();
        assert_eq!(activated, EventOutcome::Activated(vec!["frank-v1".into()]));
        assert_eq!(proxy.state(), WorkerState::Activated);

        let response = dispatcher
            .dispatch(Event::Fetch(ProxyRequest::get("/static/index.html")))
            .await
            .unwrap();
        assert_eq!(
            response,
            EventOutcome::Response(StoredResponse::new(200, "/static/index.html v1"))
        );
    }

    #[tokio::test]
    async fn concurrent_fetch_events() {
        let proxy = proxy();
        let dispatcher = proxy.dispatcher();
        dispatcher.dispatch(Event::Install).await.unwrap();
        dispatcher.dispatch(Event::Activate).await.unwrap();

        let fetches = crate::config::DEFAULT_MANIFEST
            .iter()
            .map(|url| dispatcher.dispatch(Event::Fetch(ProxyRequest::get(*url))));
        let outcomes = futures::future::try_join_all(fetches).await.unwrap();

        assert_eq!(outcomes.len(), 4);
        assert_eq!(proxy.stats().snapshot().network, 4);
    }

    #[tokio::test]
    async fn lifecycle_events_run_on_spawned_tasks() {
        let proxy = proxy();
        let dispatcher = proxy.dispatcher();

        let installer = dispatcher.clone();
        let installed = tokio::spawn(async move { installer.dispatch(Event::Install).await })
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(installed, EventOutcome::Installed(ref r) if r.entries == 4));

        let activator = dispatcher.clone();
        tokio::spawn(async move { activator.dispatch(Event::Activate).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(proxy.state(), WorkerState::Activated);
    }

    // Compile-time check: the production proxy's handlers are spawnable.
    #[allow(dead_code)]
    fn production_dispatcher_is_spawnable(proxy: &Arc<OfflineProxy>) {
        let dispatcher = proxy.dispatcher();
        drop(tokio::spawn(async move {
            dispatcher.dispatch(Event::Install).await
        }));
    }
}
