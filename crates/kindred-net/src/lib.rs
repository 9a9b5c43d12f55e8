//! # Kindred Net
//!
//! The network boundary the offline agent sits on.
//!
//! ## Design Goals
//!
//! 1. **One fetch primitive**: strategies reach the network only through [`Network`]
//! 2. **Owned snapshots**: [`Response`] bodies are `Bytes`, so a copy for the
//!    cache and a copy for the page are taken explicitly with `clone()`
//! 3. **Transport errors only**: non-2xx statuses are responses, not errors
//! 4. **Testable**: [`StubNetwork`] stands in for the real transport

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use kindred_common::KindredError;
use mime::Mime;
use thiserror::Error;
use url::Url;

pub mod http_network;
pub mod pattern;
pub mod stub;

pub use http_network::{HttpNetwork, NetworkConfig};
pub use pattern::{PatternType, UrlPattern};
pub use stub::{StubNetwork, StubRoute};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<NetError> for KindredError {
    fn from(err: NetError) -> Self {
        KindredError::network_with_source("fetch failed", err)
    }
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Request mode as reported by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Full-document load.
    Navigate,
    #[default]
    SameOrigin,
    NoCors,
    Cors,
}

impl RequestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Navigate => "navigate",
            RequestMode::SameOrigin => "same-origin",
            RequestMode::NoCors => "no-cors",
            RequestMode::Cors => "cors",
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMode {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigate" => Ok(RequestMode::Navigate),
            "same-origin" => Ok(RequestMode::SameOrigin),
            "no-cors" => Ok(RequestMode::NoCors),
            "cors" => Ok(RequestMode::Cors),
            other => Err(NetError::RequestFailed(format!("unknown request mode: {other}"))),
        }
    }
}

/// A request issued by the page and observed by the agent.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub mode: RequestMode,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            mode: RequestMode::default(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a navigation (full document) request.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate)
    }

    /// Parse a URL and create a GET request.
    pub fn parse(url: &str) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
        Ok(Self::get(url))
    }

    /// Set the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the request mode.
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Normalized identity used as the cache key.
    ///
    /// Only GET requests are ever stored, so the method is implied.
    pub fn cache_key(&self) -> String {
        cache_key_for(&self.url)
    }
}

/// Cache key for a URL: the URL without its fragment.
pub fn cache_key_for(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// HTTP response, either from the network, a cache, or synthesized offline.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Served from a cache rather than the network.
    pub from_cache: bool,
    body: Bytes,
}

impl Response {
    /// Build a response from its parts.
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            url,
            status,
            headers,
            from_cache: false,
            body,
        }
    }

    /// Build a synthetic response with a content type.
    pub fn synthetic(url: Url, status: StatusCode, content_type: &'static str, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self::new(url, status, headers, body)
    }

    /// Empty 503, used where the page degrades on its own.
    pub fn service_unavailable(url: Url) -> Self {
        Self::new(url, StatusCode::SERVICE_UNAVAILABLE, HeaderMap::new(), Bytes::new())
    }

    /// 503 with a JSON body.
    pub fn offline_json(url: Url, body: &serde_json::Value) -> Self {
        let bytes = Bytes::from(body.to_string());
        Self::synthetic(url, StatusCode::SERVICE_UNAVAILABLE, "application/json", bytes)
    }

    /// 503 with an HTML document.
    pub fn offline_html(url: Url, html: String) -> Self {
        Self::synthetic(
            url,
            StatusCode::SERVICE_UNAVAILABLE,
            "text/html; charset=utf-8",
            Bytes::from(html),
        )
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Only exact 200 responses are written to a cache.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Parsed Content-Type header.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok())
    }

    /// Borrow the body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the body.
    pub fn bytes(self) -> Bytes {
        self.body
    }

    /// Consume the response and return the body as text.
    pub fn text(self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Consume the response and decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// The host fetch primitive.
///
/// Implementations return `Ok` for every response that reached the client,
/// whatever its status, and `Err` only when the transport failed.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response, NetError>;
}
