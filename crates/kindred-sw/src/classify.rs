//! Request classification.
//!
//! Rules are checked in order and the first match wins:
//!
//! 1. non-HTTP(S) scheme or an ignore pattern → [`RequestClass::Ignored`]
//! 2. API path → [`RequestClass::Api`]
//! 3. image extension or image directory → [`RequestClass::Image`]
//! 4. template extension → [`RequestClass::Template`]
//! 5. `navigate` mode → [`RequestClass::Navigation`]
//! 6. anything else → [`RequestClass::StaticOther`]
//!
//! Non-GET requests that are not ignored are forwarded untouched; see
//! [`Classifier::dispatch`].

use http::Method;
use kindred_common::Mode;
use kindred_net::{Request, RequestMode, UrlPattern};
use url::Url;

use crate::cache::CachePurpose;
use crate::config::{AgentConfig, ApiPolicy};

/// Request class tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    Ignored,
    Navigation,
    Api,
    Image,
    Template,
    StaticOther,
}

/// Fetch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl RequestClass {
    /// Cache the class reads and writes.
    pub fn purpose(self) -> Option<CachePurpose> {
        match self {
            RequestClass::Ignored => None,
            RequestClass::Api => Some(CachePurpose::Api),
            RequestClass::Image => Some(CachePurpose::Images),
            RequestClass::Navigation | RequestClass::Template | RequestClass::StaticOther => {
                Some(CachePurpose::Static)
            }
        }
    }

    /// Strategy that serves the class in a given mode.
    pub fn strategy(self, mode: Mode) -> Option<StrategyKind> {
        match (self, mode) {
            (RequestClass::Ignored, _) => None,
            (RequestClass::Api, _) => Some(StrategyKind::NetworkFirst),
            (RequestClass::Image, _) => Some(StrategyKind::CacheFirst),
            (RequestClass::StaticOther, Mode::Production) => Some(StrategyKind::CacheFirst),
            (RequestClass::StaticOther, Mode::Development)
            | (RequestClass::Navigation, _)
            | (RequestClass::Template, _) => Some(StrategyKind::StaleWhileRevalidate),
        }
    }
}

/// What the agent does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Not intercepted; the host performs the fetch itself.
    Ignore,
    /// Sent to the network as-is, no cache involved.
    Forward,
    /// Served by the strategy for this class.
    Handle(RequestClass),
}

/// Pure request classifier built from [`AgentConfig`].
#[derive(Debug, Clone)]
pub struct Classifier {
    ignore: Vec<UrlPattern>,
    api: Vec<UrlPattern>,
    images: Vec<UrlPattern>,
    templates: Vec<UrlPattern>,
}

impl Classifier {
    pub fn from_config(config: &AgentConfig) -> Self {
        let api = match config.api_policy {
            ApiPolicy::Prefix => vec![UrlPattern::path_prefix("/api/")],
            ApiPolicy::AllowList => config
                .api_allow_list
                .iter()
                .map(|endpoint| UrlPattern::path_prefix(endpoint))
                .collect(),
        };

        let images = config
            .image_extensions
            .iter()
            .map(|ext| UrlPattern::extension(ext))
            .chain(config.image_paths.iter().map(|p| UrlPattern::path_prefix(p)))
            .collect();

        let templates = config
            .template_extensions
            .iter()
            .map(|ext| UrlPattern::extension(ext))
            .collect();

        Self {
            ignore: config.ignore_patterns.clone(),
            api,
            images,
            templates,
        }
    }

    /// Label a request. Total: every URL and mode maps to one class.
    pub fn classify(&self, url: &Url, mode: RequestMode) -> RequestClass {
        let matches_any = |patterns: &[UrlPattern]| patterns.iter().any(|p| p.matches(url));

        if !matches!(url.scheme(), "http" | "https") || matches_any(&self.ignore) {
            RequestClass::Ignored
        } else if matches_any(&self.api) {
            RequestClass::Api
        } else if matches_any(&self.images) {
            RequestClass::Image
        } else if matches_any(&self.templates) {
            RequestClass::Template
        } else if mode == RequestMode::Navigate {
            RequestClass::Navigation
        } else {
            RequestClass::StaticOther
        }
    }

    /// Decide how the agent handles a request, method included.
    pub fn dispatch(&self, request: &Request) -> Dispatch {
        match self.classify(&request.url, request.mode) {
            RequestClass::Ignored => Dispatch::Ignore,
            _ if request.method != Method::GET => Dispatch::Forward,
            class => Dispatch::Handle(class),
        }
    }
}
