//! Cache Store Registry: named, generation-tagged response caches.
//!
//! ```text
//! CacheRegistry (shared handle)
//!     └── CacheStorage
//!             └── Cache  "<prefix>-<purpose>-v<generation>"
//!                     └── key (GET url) → CacheEntry
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use kindred_common::{KindredError, Result};
use kindred_net::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

// ==================== Naming ====================

/// Opaque version tag baked into cache names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheGeneration(String);

impl CacheGeneration {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a named cache holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePurpose {
    Static,
    Api,
    Images,
}

impl CachePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePurpose::Static => "static",
            CachePurpose::Api => "api",
            CachePurpose::Images => "images",
        }
    }
}

/// A parsed cache name `<prefix>-<purpose>-v<generation>`.
///
/// The purpose is kept as text so names written by other builds, with
/// purposes this one does not know, still parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheName {
    pub prefix: String,
    pub purpose: String,
    pub generation: CacheGeneration,
}

impl CacheName {
    pub fn new(prefix: impl Into<String>, purpose: CachePurpose, generation: CacheGeneration) -> Self {
        Self {
            prefix: prefix.into(),
            purpose: purpose.as_str().to_string(),
            generation,
        }
    }

    /// Split a name into its parts. `None` if it does not follow the scheme.
    pub fn parse(name: &str) -> Option<Self> {
        let (prefix, rest) = name.split_once('-')?;
        let (purpose, generation) = rest.rsplit_once("-v")?;
        if prefix.is_empty() || purpose.is_empty() || generation.is_empty() {
            return None;
        }
        Some(Self {
            prefix: prefix.to_string(),
            purpose: purpose.to_string(),
            generation: CacheGeneration::new(generation),
        })
    }

    /// Owned by `prefix` but tagged with a generation other than `current`.
    pub fn is_stale(&self, prefix: &str, current: &CacheGeneration) -> bool {
        self.prefix == prefix && &self.generation != current
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-v{}", self.prefix, self.purpose, self.generation)
    }
}

/// Naming scheme for the current build: one prefix, one generation.
#[derive(Debug, Clone)]
pub struct CacheNaming {
    prefix: String,
    generation: CacheGeneration,
}

impl CacheNaming {
    pub fn new(prefix: impl Into<String>, generation: CacheGeneration) -> Self {
        Self {
            prefix: prefix.into(),
            generation,
        }
    }

    pub fn generation(&self) -> &CacheGeneration {
        &self.generation
    }

    /// Name of the current cache for a purpose.
    pub fn name(&self, purpose: CachePurpose) -> String {
        CacheName::new(self.prefix.clone(), purpose, self.generation.clone()).to_string()
    }

    /// Whether a cache belongs to this app but a different generation.
    /// Names outside the scheme are never stale.
    pub fn is_stale(&self, name: &str) -> bool {
        CacheName::parse(name)
            .map(|parsed| parsed.is_stale(&self.prefix, &self.generation))
            .unwrap_or(false)
    }
}

// ==================== Entries ====================

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: Url,

    /// Request method; always GET for stored entries.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Copy a response into an entry. The response itself stays usable.
    pub fn snapshot(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: response.url.clone(),
            method: Method::GET.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body().to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response, flagged as served from cache.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(n, v);
            }
        }
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut response = Response::new(
            self.url.clone(),
            status,
            headers,
            Bytes::copy_from_slice(&self.body),
        );
        response.from_cache = true;
        response
    }

    pub fn size_bytes(&self) -> usize {
        self.body.len()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ==================== Cache ====================

/// A cache instance.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries.
    entries: HashMap<String, CacheEntry>,

    #[serde(skip)]
    quota_bytes: Option<usize>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str, quota_bytes: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
            quota_bytes,
        }
    }

    /// Match a request.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry. Last write wins per key.
    pub fn put(&mut self, key: &str, entry: CacheEntry) -> Result<()> {
        if entry.method != Method::GET.as_str() {
            return Err(KindredError::cache(format!(
                "only GET responses are cacheable, got {}",
                entry.method
            )));
        }

        if let Some(quota) = self.quota_bytes {
            let replaced = self.entries.get(key).map(CacheEntry::size_bytes).unwrap_or(0);
            let used = self.size_bytes() - replaced;
            let available = quota.saturating_sub(used);
            if entry.size_bytes() > available {
                return Err(KindredError::QuotaExceeded {
                    cache: self.name.clone(),
                    needed: entry.size_bytes(),
                    available,
                });
            }
        }

        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Get all keys (URLs).
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Total body bytes held.
    pub fn size_bytes(&self) -> usize {
        self.entries.values().map(CacheEntry::size_bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// All named caches.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,

    #[serde(skip)]
    quota_bytes: Option<usize>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new(quota_bytes: Option<usize>) -> Self {
        Self {
            caches: HashMap::new(),
            quota_bytes,
        }
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        let quota = self.quota_bytes;
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name, quota))
    }

    /// Look up a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Get all cache names, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.caches.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Match across all caches.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.caches.values().find_map(|cache| cache.match_request(key))
    }

    /// Delete every cache. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.caches.len();
        self.caches.clear();
        count
    }

    fn set_quota(&mut self, quota_bytes: Option<usize>) {
        self.quota_bytes = quota_bytes;
        for cache in self.caches.values_mut() {
            cache.quota_bytes = quota_bytes;
        }
    }
}

// ==================== Registry ====================

/// Shared async handle to [`CacheStorage`].
///
/// Callers name the cache on every call; no handle to an individual cache
/// outlives a single operation.
#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    storage: Arc<RwLock<CacheStorage>>,
}

impl CacheRegistry {
    pub fn new(quota_bytes: Option<usize>) -> Self {
        Self {
            storage: Arc::new(RwLock::new(CacheStorage::new(quota_bytes))),
        }
    }

    /// Ensure a cache exists.
    pub async fn open(&self, name: &str) {
        self.storage.write().await.open(name);
    }

    /// Look up `key` in one named cache.
    pub async fn lookup(&self, name: &str, key: &str) -> Option<Response> {
        let storage = self.storage.read().await;
        storage
            .get(name)
            .and_then(|cache| cache.match_request(key))
            .map(CacheEntry::to_response)
    }

    /// Look up `key` in any cache.
    pub async fn lookup_any(&self, key: &str) -> Option<Response> {
        self.storage
            .read()
            .await
            .match_request(key)
            .map(CacheEntry::to_response)
    }

    /// Store an entry, creating the cache lazily.
    pub async fn put(&self, name: &str, key: &str, entry: CacheEntry) -> Result<()> {
        self.storage.write().await.open(name).put(key, entry)
    }

    /// Delete one entry. Does not create the cache.
    pub async fn delete_entry(&self, name: &str, key: &str) -> bool {
        let mut storage = self.storage.write().await;
        if !storage.has(name) {
            return false;
        }
        storage.open(name).delete(key)
    }

    /// Delete a whole cache.
    pub async fn delete(&self, name: &str) -> bool {
        self.storage.write().await.delete(name)
    }

    pub async fn has(&self, name: &str) -> bool {
        self.storage.read().await.has(name)
    }

    /// Names of every cache, sorted.
    pub async fn names(&self) -> Vec<String> {
        self.storage
            .read()
            .await
            .keys()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Number of entries in a cache (0 if absent).
    pub async fn entry_count(&self, name: &str) -> usize {
        self.storage.read().await.get(name).map(Cache::len).unwrap_or(0)
    }

    /// Delete every cache.
    pub async fn clear(&self) -> usize {
        self.storage.write().await.clear()
    }

    /// Write a JSON snapshot of every cache.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = {
            let storage = self.storage.read().await;
            serde_json::to_vec(&*storage)?
        };
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, path).await?;
        info!(path = %path.display(), bytes = json.len(), "Cache snapshot saved");
        Ok(())
    }

    /// Replace the contents with a snapshot written by [`CacheRegistry::save`].
    ///
    /// The configured quota carries over to the restored caches.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let mut restored: CacheStorage = serde_json::from_slice(&raw)?;

        let mut storage = self.storage.write().await;
        restored.set_quota(storage.quota_bytes);
        let count = restored.caches.len();
        *storage = restored;
        debug!(path = %path.display(), caches = count, "Cache snapshot loaded");
        Ok(count)
    }
}
