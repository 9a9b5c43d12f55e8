//! Scriptable in-memory network, used as a spy in tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use tokio::sync::watch;
use tracing::trace;

use crate::{cache_key_for, NetError, Network, Request, Response};

/// What the stub does for a URL.
#[derive(Debug, Clone)]
pub enum StubRoute {
    /// Answer with a response.
    Respond {
        status: StatusCode,
        content_type: Option<&'static str>,
        body: Bytes,
    },
    /// Fail at the transport level.
    Fail,
}

impl StubRoute {
    pub fn ok(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self::Respond {
            status: StatusCode::OK,
            content_type: Some(content_type),
            body: body.into(),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self::Respond {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }
}

/// In-memory [`Network`] with call counting, an offline switch, and a gate
/// that holds every response until released.
///
/// Unrouted URLs answer 404.
pub struct StubNetwork {
    routes: Mutex<HashMap<String, StubRoute>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
    gate: watch::Sender<bool>,
}

impl StubNetwork {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            gate,
        }
    }

    /// Route a URL.
    pub fn route(&self, url: &str, route: StubRoute) {
        self.lock_routes().insert(url.to_string(), route);
    }

    /// Route a URL to a 200 response.
    pub fn respond(&self, url: &str, content_type: &'static str, body: impl Into<Bytes>) {
        self.route(url, StubRoute::ok(content_type, body));
    }

    /// Make every fetch fail at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold all fetches until [`StubNetwork::release`].
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    /// Let held fetches complete.
    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    /// Number of fetches issued for a URL.
    pub fn calls(&self, url: &str) -> usize {
        self.lock_calls().get(url).copied().unwrap_or(0)
    }

    /// Number of fetches issued overall.
    pub fn total_calls(&self) -> usize {
        self.lock_calls().values().sum()
    }

    fn lock_routes(&self) -> std::sync::MutexGuard<'_, HashMap<String, StubRoute>> {
        self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for StubNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        let key = cache_key_for(&request.url);
        *self.lock_calls().entry(key.clone()).or_insert(0) += 1;
        trace!(url = %key, "Stub fetch");

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|held| !*held).await.is_err() {
            return Err(NetError::Cancelled);
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Unreachable(key));
        }

        let route = self.lock_routes().get(&key).cloned();
        match route {
            Some(StubRoute::Respond {
                status,
                content_type,
                body,
            }) => {
                let mut headers = HeaderMap::new();
                if let Some(ct) = content_type {
                    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
                }
                Ok(Response::new(request.url, status, headers, body))
            }
            Some(StubRoute::Fail) => Err(NetError::Unreachable(key)),
            None => Ok(Response::new(
                request.url,
                StatusCode::NOT_FOUND,
                HeaderMap::new(),
                Bytes::new(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_routes_and_counts() {
        let stub = StubNetwork::new();
        stub.respond("https://kindred.app/api/feed", "application/json", "[]");

        let response = stub
            .fetch(Request::parse("https://kindred.app/api/feed").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let missing = stub
            .fetch(Request::parse("https://kindred.app/nope").unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        assert_eq!(stub.calls("https://kindred.app/api/feed"), 1);
        assert_eq!(stub.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_offline_fails() {
        let stub = StubNetwork::new();
        stub.set_offline(true);
        let result = stub
            .fetch(Request::parse("https://kindred.app/").unwrap())
            .await;
        assert!(matches!(result, Err(NetError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let stub = Arc::new(StubNetwork::new());
        stub.respond("https://kindred.app/", "text/html", "<html></html>");
        stub.hold();

        let task = {
            let stub = Arc::clone(&stub);
            tokio::spawn(async move {
                stub.fetch(Request::parse("https://kindred.app/").unwrap())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        stub.release();
        let response = task.await.unwrap().unwrap();
        assert!(response.ok());
    }
}
