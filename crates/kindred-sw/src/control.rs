//! Control Channel messages posted by the page.

use kindred_common::Result;
use serde::{Deserialize, Serialize};

/// A control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// `SKIP_WAITING`
    SkipWaiting,
    /// `CLEAR_CACHE`
    ClearCache,
    /// `UPDATE_<RESOURCE>_CACHE`, resource lower-cased.
    UpdateResourceCache(String),
}

/// Reply sent on the message port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

impl ControlMessage {
    /// Map a `type` discriminator to a message. Unknown types yield `None`.
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "SKIP_WAITING" => Some(ControlMessage::SkipWaiting),
            "CLEAR_CACHE" => Some(ControlMessage::ClearCache),
            other => other
                .strip_prefix("UPDATE_")
                .and_then(|rest| rest.strip_suffix("_CACHE"))
                .filter(|resource| !resource.is_empty())
                .map(|resource| ControlMessage::UpdateResourceCache(resource.to_ascii_lowercase())),
        }
    }

    /// Parse a posted JSON message `{"type": "..."}`.
    pub fn parse(json: &str) -> Result<Option<Self>> {
        let envelope: Envelope = serde_json::from_str(json)?;
        Ok(Self::from_type(&envelope.kind))
    }

    /// API path a resource invalidation targets, e.g. `/api/profile`.
    pub fn resource_path(&self) -> Option<String> {
        match self {
            ControlMessage::UpdateResourceCache(resource) => Some(format!("/api/{resource}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(
            ControlMessage::parse(r#"{"type":"SKIP_WAITING"}"#).unwrap(),
            Some(ControlMessage::SkipWaiting)
        );
        assert_eq!(
            ControlMessage::parse(r#"{"type":"CLEAR_CACHE"}"#).unwrap(),
            Some(ControlMessage::ClearCache)
        );
        assert_eq!(
            ControlMessage::parse(r#"{"type":"UPDATE_MATCHES_CACHE","extra":1}"#).unwrap(),
            Some(ControlMessage::UpdateResourceCache("matches".to_string()))
        );
    }

    #[test]
    fn test_unknown_and_malformed() {
        assert_eq!(ControlMessage::parse(r#"{"type":"PING"}"#).unwrap(), None);
        assert_eq!(ControlMessage::from_type("UPDATE__CACHE"), None);
        assert!(ControlMessage::parse(r#"{"kind":"CLEAR_CACHE"}"#).is_err());
    }

    #[test]
    fn test_resource_path() {
        let message = ControlMessage::from_type("UPDATE_PROFILE_CACHE").unwrap();
        assert_eq!(message.resource_path().as_deref(), Some("/api/profile"));
        assert_eq!(ControlMessage::ClearCache.resource_path(), None);
    }

    #[test]
    fn test_reply_shape() {
        assert_eq!(serde_json::to_string(&ControlReply::ok()).unwrap(), r#"{"success":true}"#);
        let failed = serde_json::to_value(ControlReply::failed("bad path")).unwrap();
        assert_eq!(failed["success"], false);
        assert_eq!(failed["error"], "bad path");
    }
}
