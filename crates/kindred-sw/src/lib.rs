//! # Kindred Offline Agent
//!
//! Network interception and offline caching for the Kindred web app.
//!
//! ## Features
//!
//! - **Cache Store Registry**: named caches `<prefix>-<purpose>-v<generation>`
//! - **Request Classifier**: ignored, navigation, api, image, template, static-other
//! - **Strategies**: cache-first, network-first, stale-while-revalidate
//! - **Lifecycle**: install, activate, skip-waiting, claim
//! - **Control Channel**: clear caches, invalidate entries, force activation
//!
//! ## Architecture
//!
//! ```text
//! InterceptionAgent
//!     ├── Lifecycle ── install → installed → activating → activated
//!     ├── Classifier ── Request → RequestClass
//!     ├── StrategyExecutor
//!     │       ├── Network (host fetch primitive)
//!     │       ├── CacheRegistry
//!     │       │       └── CacheStorage → Cache → key → CacheEntry
//!     │       └── BackgroundTasks
//!     └── Control Channel ── ControlMessage → ControlReply
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kindred_common::Mode;
//! use kindred_net::{HttpNetwork, NetworkConfig, Request};
//! use kindred_sw::{AgentConfig, InterceptionAgent};
//!
//! let network = Arc::new(HttpNetwork::new(NetworkConfig::default())?);
//! let (agent, events) = InterceptionAgent::new(Mode::Production, AgentConfig::default(), network)?;
//! agent.start().await?;
//! let outcome = agent.on_fetch(Request::parse("https://kindred.app/api/matches")?).await;
//! agent.background().drain().await;
//! ```

pub mod agent;
pub mod background;
pub mod cache;
pub mod classify;
pub mod config;
pub mod control;
pub mod lifecycle;
pub mod offline;
pub mod strategy;

pub use agent::{FetchOutcome, InterceptionAgent};
pub use background::BackgroundTasks;
pub use cache::{
    Cache, CacheEntry, CacheGeneration, CacheName, CacheNaming, CachePurpose, CacheRegistry,
    CacheStorage,
};
pub use classify::{Classifier, Dispatch, RequestClass, StrategyKind};
pub use config::{AgentConfig, ApiPolicy, OfflineMessages};
pub use control::{ControlMessage, ControlReply};
pub use lifecycle::{AgentEvent, Client, Clients, Lifecycle, LifecycleError, LifecycleState};
pub use offline::{offline_api_response, offline_page, OFFLINE_ERROR};
pub use strategy::{store_response, StrategyExecutor};
