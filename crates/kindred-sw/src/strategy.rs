//! Strategy Executors.
//!
//! Each strategy turns one request into exactly one response and never
//! fails: transport and storage errors degrade to a cached or synthetic
//! response. A network response that is both cached and returned is
//! snapshotted into the cache first, then handed to the caller.

use std::sync::Arc;

use http::Method;
use kindred_common::Mode;
use kindred_net::{cache_key_for, Network, Request, Response};
use tracing::{debug, warn};
use url::Url;

use crate::background::BackgroundTasks;
use crate::cache::{CacheEntry, CacheRegistry};
use crate::classify::{RequestClass, StrategyKind};
use crate::config::OfflineMessages;
use crate::offline::{offline_api_response, offline_page};

/// Write a 200 GET response to a cache. Storage failures are logged and
/// swallowed so the response path is never affected.
pub async fn store_response(caches: &CacheRegistry, cache_name: &str, key: &str, response: &Response) {
    if !response.is_cacheable() {
        return;
    }
    if let Err(e) = caches.put(cache_name, key, CacheEntry::snapshot(response)).await {
        warn!(cache = cache_name, key, category = e.category(), error = %e, "Cache write skipped");
    }
}

/// Runs strategies against the shared caches and the network.
#[derive(Clone)]
pub struct StrategyExecutor {
    network: Arc<dyn Network>,
    caches: CacheRegistry,
    background: BackgroundTasks,
    offline: Arc<OfflineMessages>,
    mode: Mode,
}

impl StrategyExecutor {
    pub fn new(
        network: Arc<dyn Network>,
        caches: CacheRegistry,
        background: BackgroundTasks,
        offline: OfflineMessages,
        mode: Mode,
    ) -> Self {
        Self {
            network,
            caches,
            background,
            offline: Arc::new(offline),
            mode,
        }
    }

    /// Serve a classified GET request with the given strategy.
    pub async fn run(
        &self,
        class: RequestClass,
        strategy: StrategyKind,
        request: Request,
        cache_name: &str,
    ) -> Response {
        match strategy {
            StrategyKind::CacheFirst => self.cache_first(request, cache_name).await,
            StrategyKind::NetworkFirst => self.network_first(request, cache_name).await,
            StrategyKind::StaleWhileRevalidate => {
                let url = request.url.clone();
                match self.revalidate(request, cache_name).await {
                    Some(response) => response,
                    None if class == RequestClass::Navigation => {
                        self.navigation_fallback(&url, cache_name).await
                    }
                    None => Response::service_unavailable(url),
                }
            }
        }
    }

    /// Send a request straight to the network, bypassing every cache.
    pub async fn forward(&self, request: Request) -> Response {
        let url = request.url.clone();
        let method = request.method.clone();
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, method = %method, error = %e, "Forwarded request failed");
                offline_api_response(&url, &self.offline)
            }
        }
    }

    /// Cache hit returns without touching the network; a miss fetches and
    /// stores 200s; a failed miss answers an empty 503.
    pub async fn cache_first(&self, request: Request, cache_name: &str) -> Response {
        let key = request.cache_key();
        if let Some(cached) = self.caches.lookup(cache_name, &key).await {
            debug!(key = %key, cache = cache_name, "Cache-first hit");
            return cached;
        }

        let url = request.url.clone();
        match self.network.fetch(request).await {
            Ok(response) => {
                store_response(&self.caches, cache_name, &key, &response).await;
                response
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Cache-first miss and network failed");
                Response::service_unavailable(url)
            }
        }
    }

    /// Network answers whatever its status; only a transport failure falls
    /// back to the cache, then to the offline JSON body.
    pub async fn network_first(&self, request: Request, cache_name: &str) -> Response {
        let key = request.cache_key();
        let url = request.url.clone();
        let is_get = request.method == Method::GET;

        match self.network.fetch(request).await {
            Ok(response) => {
                if is_get {
                    store_response(&self.caches, cache_name, &key, &response).await;
                }
                response
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Network-first falling back to cache");
                match self.caches.lookup(cache_name, &key).await {
                    Some(cached) => cached,
                    None => {
                        warn!(url = %url, "Offline with no cached API response");
                        offline_api_response(&url, &self.offline)
                    }
                }
            }
        }
    }

    /// Stale-while-revalidate; the empty 503 stands in for total failure.
    pub async fn stale_while_revalidate(&self, request: Request, cache_name: &str) -> Response {
        let url = request.url.clone();
        match self.revalidate(request, cache_name).await {
            Some(response) => response,
            None => Response::service_unavailable(url),
        }
    }

    /// Core of stale-while-revalidate. `None` means neither the network nor
    /// the cache produced a response.
    ///
    /// Development always waits for the network and uses the cache only when
    /// the fetch fails. Production answers from cache when it can and
    /// refreshes the entry as a background task.
    async fn revalidate(&self, request: Request, cache_name: &str) -> Option<Response> {
        let key = request.cache_key();
        let cached = self.caches.lookup(cache_name, &key).await;

        let network = Arc::clone(&self.network);
        let caches = self.caches.clone();
        let cache_name_owned = cache_name.to_string();
        let refresh = async move {
            let url = request.url.clone();
            match network.fetch(request).await {
                Ok(response) => {
                    store_response(&caches, &cache_name_owned, &key, &response).await;
                    Some(response)
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Revalidation fetch failed");
                    None
                }
            }
        };

        match (self.mode, cached) {
            (Mode::Development, cached) => refresh.await.or(cached),
            (Mode::Production, Some(hit)) => {
                self.background.wait_until("revalidate", async move {
                    refresh.await;
                });
                Some(hit)
            }
            (Mode::Production, None) => refresh.await,
        }
    }

    /// Last resort for a navigation: cached `/index.html`, then any cached
    /// copy of the exact URL, then the offline page.
    pub async fn navigation_fallback(&self, url: &Url, static_cache: &str) -> Response {
        if let Ok(index) = url.join("/index.html") {
            if let Some(shell) = self.caches.lookup(static_cache, &cache_key_for(&index)).await {
                debug!(url = %url, "Navigation served from cached app shell");
                return shell;
            }
        }

        if let Some(exact) = self.caches.lookup_any(&cache_key_for(url)).await {
            debug!(url = %url, "Navigation served from cached exact match");
            return exact;
        }

        warn!(url = %url, "Navigation offline with nothing cached");
        offline_page(url, &self.offline)
    }
}
