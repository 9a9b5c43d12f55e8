//! # Kindred Common
//!
//! Shared building blocks for the Kindred offline caching agent.
//!
//! ## Features
//!
//! - Explicit [`Mode`] selection handed to the agent by its host
//! - Unified error type with backtrace support
//! - Logging configuration and setup

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat};

/// Execution mode of the agent.
///
/// Chosen by the host at startup and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Local development: pre-caching is skipped and the network always wins.
    Development,
    /// Deployed build: caches are served first where the strategy allows.
    #[default]
    Production,
}

impl Mode {
    pub fn is_development(self) -> bool {
        self == Mode::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = KindredError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(KindredError::InvalidArgument(format!("unknown mode: {other}"))),
        }
    }
}

/// Unified error type for Kindred.
#[derive(Error, Debug)]
pub enum KindredError {
    /// Transport-level failures (DNS, connection, TLS).
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Cache storage failures.
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// A cache write would exceed the configured quota.
    #[error("Cache quota exceeded for {cache}: {needed} bytes needed, {available} available")]
    QuotaExceeded {
        cache: String,
        needed: usize,
        available: usize,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl KindredError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Whether the agent recovers from this error locally by falling back
    /// to a cached or synthetic response.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KindredError::Network { .. }
                | KindredError::Cache { .. }
                | KindredError::QuotaExceeded { .. }
                | KindredError::Io(_)
        )
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            KindredError::Network { .. } => "network",
            KindredError::Cache { .. } => "cache",
            KindredError::QuotaExceeded { .. } => "quota",
            KindredError::Config { .. } => "config",
            KindredError::Io(_) => "io",
            KindredError::Json(_) => "json",
            KindredError::NotFound(_) => "not_found",
            KindredError::InvalidArgument(_) => "invalid_argument",
            KindredError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for Kindred operations.
pub type Result<T> = std::result::Result<T, KindredError>;
