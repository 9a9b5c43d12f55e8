//! Agent configuration

use std::path::Path;

use kindred_common::{KindredError, Result};
use kindred_net::UrlPattern;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::CacheGeneration;

/// Agent configuration, baked in at build time or loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Namespace shared by every cache this app owns
    pub cache_prefix: String,

    /// Current cache generation
    pub generation: CacheGeneration,

    /// Origin the agent serves; control messages resolve paths against it
    pub origin: Url,

    /// Paths pre-cached on install in production
    pub precache: Vec<String>,

    /// Which requests count as API calls
    pub api_policy: ApiPolicy,

    /// Endpoints matched under [`ApiPolicy::AllowList`]
    pub api_allow_list: Vec<String>,

    /// Image file extensions, without the dot
    pub image_extensions: Vec<String>,

    /// Path prefixes holding images regardless of extension
    pub image_paths: Vec<String>,

    /// Template file extensions
    pub template_extensions: Vec<String>,

    /// Requests the agent never touches
    pub ignore_patterns: Vec<UrlPattern>,

    /// Text used in synthetic offline responses
    pub offline: OfflineMessages,

    /// Byte quota per named cache; `None` is unbounded
    pub quota_bytes: Option<usize>,
}

/// API matching policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiPolicy {
    /// Any path under `/api/`
    #[default]
    Prefix,
    /// Only the curated endpoints in `api_allow_list`
    AllowList,
}

/// Localizable text for offline fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineMessages {
    pub generic: String,
    pub profile: String,
    pub matches: String,
    pub feed: String,
    pub page_title: String,
    pub page_heading: String,
    pub page_body: String,
    pub reload_label: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cache_prefix: "kindred".to_string(),
            generation: CacheGeneration::new("1"),
            origin: Url::parse("http://localhost:3000/").expect("static origin is valid"),
            precache: vec!["/".to_string(), "/index.html".to_string()],
            api_policy: ApiPolicy::Prefix,
            api_allow_list: [
                "/api/profile",
                "/api/matches",
                "/api/feed",
                "/api/auth",
                "/api/photos",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            image_extensions: ["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            image_paths: vec!["/uploads/".to_string(), "/assets/images/".to_string()],
            template_extensions: vec!["hbs".to_string(), "handlebars".to_string()],
            ignore_patterns: default_ignore_patterns(),
            offline: OfflineMessages::default(),
            quota_bytes: None,
        }
    }
}

impl Default for OfflineMessages {
    fn default() -> Self {
        Self {
            generic: "No internet connection".to_string(),
            profile: "Profile is unavailable offline".to_string(),
            matches: "Matches are unavailable offline".to_string(),
            feed: "New profiles will load once you are back online".to_string(),
            page_title: "Kindred - Offline".to_string(),
            page_heading: "You are offline".to_string(),
            page_body: "Check your connection and try again.".to_string(),
            reload_label: "Reload".to_string(),
        }
    }
}

/// Bundler dev-server internals and HMR traffic.
fn default_ignore_patterns() -> Vec<UrlPattern> {
    vec![
        UrlPattern::path_prefix("/@vite/"),
        UrlPattern::path_prefix("/@fs/"),
        UrlPattern::path_prefix("/@id/"),
        UrlPattern::path_prefix("/@react-refresh"),
        UrlPattern::path_prefix("/node_modules/.vite/"),
        UrlPattern::path_prefix("/__vite"),
        UrlPattern::path_prefix("/sockjs-node"),
        UrlPattern::contains("hot-update"),
        UrlPattern::contains("webpack-dev-server"),
        UrlPattern::contains("?token="),
    ]
}

impl AgentConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KindredError::config_with_source("invalid agent config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations that would break cache naming or routing.
    pub fn validate(&self) -> Result<()> {
        if self.cache_prefix.trim().is_empty() {
            return Err(KindredError::config("cache_prefix must not be empty"));
        }
        if self.cache_prefix.contains('-') {
            return Err(KindredError::config("cache_prefix must not contain '-'"));
        }
        if self.generation.as_str().trim().is_empty() {
            return Err(KindredError::config("generation must not be empty"));
        }
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(KindredError::config(format!(
                "origin must be http(s), got {}",
                self.origin
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.precache, vec!["/", "/index.html"]);
        assert_eq!(config.api_policy, ApiPolicy::Prefix);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AgentConfig::from_json_str(
            r#"{"generation":"42","api_policy":"allow_list","offline":{"generic":"Sin conexión"}}"#,
        )
        .unwrap();
        assert_eq!(config.generation.as_str(), "42");
        assert_eq!(config.api_policy, ApiPolicy::AllowList);
        assert_eq!(config.offline.generic, "Sin conexión");
        assert_eq!(config.offline.reload_label, "Reload");
        assert_eq!(config.cache_prefix, "kindred");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(AgentConfig::from_json_str(r#"{"cache_prefix":""}"#).is_err());
        assert!(AgentConfig::from_json_str(r#"{"cache_prefix":"my-app"}"#).is_err());
        assert!(AgentConfig::from_json_str(r#"{"generation":" "}"#).is_err());
        assert!(AgentConfig::from_json_str(r#"{"origin":"file:///tmp/"}"#).is_err());
        assert!(AgentConfig::from_json_str("not json").is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        tokio::fs::write(&path, r#"{"generation":"7","quota_bytes":1024}"#)
            .await
            .unwrap();

        let config = AgentConfig::load(&path).await.unwrap();
        assert_eq!(config.generation.as_str(), "7");
        assert_eq!(config.quota_bytes, Some(1024));
    }
}
