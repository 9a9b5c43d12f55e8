//! Lifecycle state machine, controlled pages, and agent events.

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

// ==================== State ====================

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Constructed, no lifecycle event yet.
    #[default]
    Parsed,
    /// Install event running.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activate event running.
    Activating,
    /// Active and controlling pages.
    Activated,
}

impl LifecycleState {
    fn next(self) -> Option<Self> {
        match self {
            LifecycleState::Parsed => Some(LifecycleState::Installing),
            LifecycleState::Installing => Some(LifecycleState::Installed),
            LifecycleState::Installed => Some(LifecycleState::Activating),
            LifecycleState::Activating => Some(LifecycleState::Activated),
            LifecycleState::Activated => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
        };
        f.write_str(s)
    }
}

/// Lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

/// Lifecycle bookkeeping.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: LifecycleState,
    skip_waiting: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Parsed,
            skip_waiting: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Move to `to`; only the next state in line is accepted.
    pub fn transition(&mut self, to: LifecycleState) -> Result<(), LifecycleError> {
        if self.state.next() != Some(to) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Request activation without waiting for older instances.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Activated
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Clients ====================

/// An open page.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Whether the agent controls this page.
    pub controlled: bool,
}

/// Open pages known to the agent.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Add an uncontrolled client.
    pub fn add(&mut self, id: impl Into<String>, url: Url) {
        let id = id.into();
        self.clients.insert(
            id.clone(),
            Client {
                id,
                url,
                controlled: false,
            },
        );
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// All clients, optionally including uncontrolled ones.
    pub fn match_all(&self, include_uncontrolled: bool) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| include_uncontrolled || c.controlled)
            .collect()
    }

    /// Take control of every open page. Returns the IDs that changed.
    pub fn claim(&mut self) -> Vec<String> {
        let mut claimed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| !c.controlled)
            .map(|c| {
                c.controlled = true;
                c.id.clone()
            })
            .collect();
        claimed.sort();
        claimed
    }
}

// ==================== Events ====================

/// Events emitted to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// State changed.
    StateChange { state: LifecycleState },
    /// Activation requested without waiting.
    SkipWaiting,
    /// A stale-generation cache was deleted.
    CacheDeleted { name: String },
    /// A page is now controlled by the agent.
    ControllerChange { client_id: String },
    /// Every cache was deleted.
    CacheCleared { count: usize },
    /// One cached entry was dropped on request.
    EntryInvalidated { cache: String, key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Parsed);

        for state in [
            LifecycleState::Installing,
            LifecycleState::Installed,
            LifecycleState::Activating,
            LifecycleState::Activated,
        ] {
            lifecycle.transition(state).unwrap();
        }
        assert!(lifecycle.is_active());
    }

    #[test]
    fn test_lifecycle_rejects_skips_and_repeats() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.transition(LifecycleState::Activated).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: LifecycleState::Parsed,
                to: LifecycleState::Activated,
            }
        );

        lifecycle.transition(LifecycleState::Installing).unwrap();
        assert!(lifecycle.transition(LifecycleState::Installing).is_err());
    }

    #[test]
    fn test_skip_waiting_flag() {
        let mut lifecycle = Lifecycle::new();
        assert!(!lifecycle.skip_waiting_requested());
        lifecycle.skip_waiting();
        assert!(lifecycle.skip_waiting_requested());
    }

    #[test]
    fn test_clients_claim() {
        let mut clients = Clients::new();
        clients.add("b", Url::parse("https://kindred.app/feed").unwrap());
        clients.add("a", Url::parse("https://kindred.app/matches").unwrap());

        assert!(clients.match_all(false).is_empty());
        assert_eq!(clients.match_all(true).len(), 2);

        assert_eq!(clients.claim(), vec!["a".to_string(), "b".to_string()]);
        assert!(clients.get("a").unwrap().controlled);
        assert!(clients.claim().is_empty());

        assert!(clients.remove("a").is_some());
        assert_eq!(clients.match_all(false).len(), 1);
    }
}
