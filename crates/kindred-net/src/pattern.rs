//! URL patterns for classifying intercepted requests.

use serde::{Deserialize, Serialize};
use url::Url;

/// URL pattern for matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPattern {
    /// Pattern type.
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    /// Pattern string.
    pub pattern: String,
}

/// Type of URL pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Exact URL match.
    Exact,
    /// Prefix of the full URL.
    Prefix,
    /// Suffix of the full URL.
    Suffix,
    /// Substring anywhere in the full URL.
    Contains,
    /// Prefix of the URL path.
    PathPrefix,
    /// File extension of the last path segment, without the dot.
    Extension,
}

impl UrlPattern {
    fn new(pattern_type: PatternType, pattern: &str) -> Self {
        Self {
            pattern_type,
            pattern: pattern.to_string(),
        }
    }

    /// Create a contains pattern.
    pub fn contains(substring: &str) -> Self {
        Self::new(PatternType::Contains, substring)
    }

    /// Create a path prefix pattern, e.g. `/api/`.
    pub fn path_prefix(prefix: &str) -> Self {
        Self::new(PatternType::PathPrefix, prefix)
    }

    /// Create an extension pattern, e.g. `png`.
    pub fn extension(ext: &str) -> Self {
        Self::new(PatternType::Extension, ext.trim_start_matches('.'))
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        let url_str = url.as_str();
        match self.pattern_type {
            PatternType::Exact => url_str == self.pattern,
            PatternType::Prefix => url_str.starts_with(&self.pattern),
            PatternType::Suffix => url_str.ends_with(&self.pattern),
            PatternType::Contains => url_str.contains(&self.pattern),
            PatternType::PathPrefix => url.path().starts_with(&self.pattern),
            PatternType::Extension => extension_of(url)
                .map(|ext| ext.eq_ignore_ascii_case(&self.pattern))
                .unwrap_or(false),
        }
    }
}

/// Extension of the last path segment, if any.
fn extension_of(url: &Url) -> Option<&str> {
    let last = url.path_segments()?.next_back()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}
