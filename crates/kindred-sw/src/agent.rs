//! The interception agent: one object wired to the host's install,
//! activate, fetch, and message events.

use std::sync::Arc;

use kindred_common::{Mode, Result};
use kindred_net::{cache_key_for, Network, Request, Response};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::background::BackgroundTasks;
use crate::cache::{CacheNaming, CachePurpose, CacheRegistry};
use crate::classify::{Classifier, Dispatch};
use crate::config::AgentConfig;
use crate::control::{ControlMessage, ControlReply};
use crate::lifecycle::{AgentEvent, Clients, Lifecycle, LifecycleError, LifecycleState};
use crate::strategy::{store_response, StrategyExecutor};

/// Result of a fetch event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request itself.
    Passthrough,
    /// Answer the page with this response.
    Respond(Response),
}

impl FetchOutcome {
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Respond(response) => Some(response),
        }
    }
}

/// The offline caching agent.
pub struct InterceptionAgent {
    mode: Mode,
    config: Arc<AgentConfig>,
    naming: CacheNaming,
    classifier: Classifier,
    caches: CacheRegistry,
    network: Arc<dyn Network>,
    executor: StrategyExecutor,
    background: BackgroundTasks,
    lifecycle: Arc<RwLock<Lifecycle>>,
    clients: Arc<RwLock<Clients>>,
    event_tx: mpsc::UnboundedSender<AgentEvent>,
}

impl InterceptionAgent {
    /// Create an agent. The host decides the mode; it is fixed for the
    /// agent's lifetime.
    pub fn new(
        mode: Mode,
        config: AgentConfig,
        network: Arc<dyn Network>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AgentEvent>)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let naming = CacheNaming::new(config.cache_prefix.clone(), config.generation.clone());
        let classifier = Classifier::from_config(&config);
        let caches = CacheRegistry::new(config.quota_bytes);
        let background = BackgroundTasks::new();
        let executor = StrategyExecutor::new(
            Arc::clone(&network),
            caches.clone(),
            background.clone(),
            config.offline.clone(),
            mode,
        );

        info!(%mode, generation = %config.generation, origin = %config.origin, "Interception agent created");

        Ok((
            Self {
                mode,
                config: Arc::new(config),
                naming,
                classifier,
                caches,
                network,
                executor,
                background,
                lifecycle: Arc::new(RwLock::new(Lifecycle::new())),
                clients: Arc::new(RwLock::new(Clients::new())),
                event_tx,
            },
            event_rx,
        ))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn naming(&self) -> &CacheNaming {
        &self.naming
    }

    /// Shared cache handle.
    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    /// Work the host must let finish before idling the agent.
    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Open pages.
    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        Arc::clone(&self.clients)
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.read().await.state()
    }

    /// Whether the agent controls a page.
    pub async fn controls(&self, client_id: &str) -> bool {
        self.lifecycle.read().await.is_active()
            && self
                .clients
                .read()
                .await
                .get(client_id)
                .map(|c| c.controlled)
                .unwrap_or(false)
    }

    /// Install, then activate if skip-waiting was requested.
    pub async fn start(&self) -> std::result::Result<(), LifecycleError> {
        self.on_install().await?;
        if self.lifecycle.read().await.skip_waiting_requested() {
            self.on_activate().await?;
        }
        Ok(())
    }

    // ==================== Lifecycle ====================

    /// Install event. Production pre-caches the manifest; a failed entry is
    /// logged and skipped. Both modes finish by requesting skip-waiting.
    pub async fn on_install(&self) -> std::result::Result<(), LifecycleError> {
        self.transition(LifecycleState::Installing).await?;

        match self.mode {
            Mode::Development => debug!("Development mode, skipping precache"),
            Mode::Production => {
                let cached = self.precache().await;
                info!(cached, total = self.config.precache.len(), "Precache complete");
            }
        }

        self.transition(LifecycleState::Installed).await?;
        self.skip_waiting().await;
        Ok(())
    }

    /// Activate event. Every stale generation is deleted before any page is
    /// claimed.
    pub async fn on_activate(&self) -> std::result::Result<(), LifecycleError> {
        self.transition(LifecycleState::Activating).await?;

        let deleted = self.evict_stale_generations().await;
        if !deleted.is_empty() {
            info!(count = deleted.len(), "Stale cache generations deleted");
        }

        let claimed = self.clients.write().await.claim();
        for client_id in claimed {
            self.emit(AgentEvent::ControllerChange { client_id });
        }

        self.transition(LifecycleState::Activated).await
    }

    /// Force activation without waiting for older instances to close.
    pub async fn skip_waiting(&self) {
        self.lifecycle.write().await.skip_waiting();
        self.emit(AgentEvent::SkipWaiting);
    }

    async fn precache(&self) -> usize {
        let cache_name = self.naming.name(CachePurpose::Static);
        self.caches.open(&cache_name).await;

        let mut cached = 0;
        for path in &self.config.precache {
            let url = match self.config.origin.join(path) {
                Ok(url) => url,
                Err(e) => {
                    warn!(path = %path, error = %e, "Invalid precache path");
                    continue;
                }
            };
            let key = cache_key_for(&url);
            match self.network.fetch(Request::get(url)).await {
                Ok(response) if response.is_cacheable() => {
                    store_response(&self.caches, &cache_name, &key, &response).await;
                    cached += 1;
                }
                Ok(response) => {
                    warn!(key = %key, status = %response.status, "Precache entry not cacheable");
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Precache entry failed");
                }
            }
        }
        cached
    }

    async fn evict_stale_generations(&self) -> Vec<String> {
        let mut deleted = Vec::new();
        for name in self.caches.names().await {
            if self.naming.is_stale(&name) && self.caches.delete(&name).await {
                info!(cache = %name, "Deleted stale cache");
                self.emit(AgentEvent::CacheDeleted { name: name.clone() });
                deleted.push(name);
            }
        }
        deleted
    }

    async fn transition(&self, to: LifecycleState) -> std::result::Result<(), LifecycleError> {
        self.lifecycle.write().await.transition(to)?;
        debug!(state = %to, "Lifecycle state changed");
        self.emit(AgentEvent::StateChange { state: to });
        Ok(())
    }

    // ==================== Clients ====================

    /// A page opened. An active agent controls it straight away.
    pub async fn client_opened(&self, id: impl Into<String>, url: Url) {
        let active = self.lifecycle.read().await.is_active();
        let mut clients = self.clients.write().await;
        clients.add(id, url);
        if active {
            for client_id in clients.claim() {
                self.emit(AgentEvent::ControllerChange { client_id });
            }
        }
    }

    /// A page closed.
    pub async fn client_closed(&self, id: &str) {
        if self.clients.write().await.remove(id).is_none() {
            debug!(client = id, "Closed page was not tracked");
        }
    }

    /// IDs of the pages under the agent's control, sorted.
    pub async fn controlled_clients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .clients
            .read()
            .await
            .match_all(false)
            .into_iter()
            .map(|c| c.id.clone())
            .collect();
        ids.sort();
        ids
    }

    // ==================== Fetch ====================

    /// Fetch event. Exactly one strategy answers each intercepted request.
    pub async fn on_fetch(&self, request: Request) -> FetchOutcome {
        match self.classifier.dispatch(&request) {
            Dispatch::Ignore => {
                debug!(url = %request.url, "Request not intercepted");
                FetchOutcome::Passthrough
            }
            Dispatch::Forward => {
                debug!(url = %request.url, method = %request.method, "Forwarding non-GET request");
                FetchOutcome::Respond(self.executor.forward(request).await)
            }
            Dispatch::Handle(class) => {
                let (Some(strategy), Some(purpose)) = (class.strategy(self.mode), class.purpose())
                else {
                    return FetchOutcome::Passthrough;
                };
                let cache_name = self.naming.name(purpose);
                debug!(url = %request.url, ?class, ?strategy, cache = %cache_name, "Intercepted request");
                FetchOutcome::Respond(self.executor.run(class, strategy, request, &cache_name).await)
            }
        }
    }

    // ==================== Control Channel ====================

    /// Message event. The reply port, when given, receives the outcome.
    pub async fn on_message(&self, message: ControlMessage, reply: Option<oneshot::Sender<ControlReply>>) {
        info!(?message, "Control message received");

        let outcome = match &message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting().await;
                ControlReply::ok()
            }
            ControlMessage::ClearCache => {
                let count = self.caches.clear().await;
                self.emit(AgentEvent::CacheCleared { count });
                ControlReply::ok()
            }
            ControlMessage::UpdateResourceCache(_) => self.invalidate_resource(&message).await,
        };

        reply_to(reply, outcome);
    }

    /// Parse a raw JSON message and handle it. Unknown or malformed
    /// messages change nothing and get a failure reply.
    pub async fn on_raw_message(&self, json: &str, reply: Option<oneshot::Sender<ControlReply>>) {
        match ControlMessage::parse(json) {
            Ok(Some(message)) => self.on_message(message, reply).await,
            Ok(None) => {
                warn!(message = json, "Unknown control message type");
                reply_to(reply, ControlReply::failed("unknown message type"));
            }
            Err(e) => {
                warn!(error = %e, "Malformed control message");
                reply_to(reply, ControlReply::failed(e.to_string()));
            }
        }
    }

    async fn invalidate_resource(&self, message: &ControlMessage) -> ControlReply {
        let Some(path) = message.resource_path() else {
            return ControlReply::failed("not a resource message");
        };
        let url = match self.config.origin.join(&path) {
            Ok(url) => url,
            Err(e) => return ControlReply::failed(e.to_string()),
        };

        let cache = self.naming.name(CachePurpose::Api);
        let key = cache_key_for(&url);
        if self.caches.delete_entry(&cache, &key).await {
            info!(cache = %cache, key = %key, "Cached entry invalidated");
            self.emit(AgentEvent::EntryInvalidated { cache, key });
        } else {
            debug!(cache = %cache, key = %key, "Nothing cached to invalidate");
        }
        ControlReply::ok()
    }

    fn emit(&self, event: AgentEvent) {
        // The host may not listen; dropped events are fine.
        let _ = self.event_tx.send(event);
    }
}

fn reply_to(port: Option<oneshot::Sender<ControlReply>>, outcome: ControlReply) {
    if let Some(port) = port {
        if port.send(outcome).is_err() {
            debug!("Control reply port closed");
        }
    }
}
