//! Container identities and live state.
//!
//! `ContainerState` is always read live from the engine when needed; it is
//! carried on `ContainerBrief` purely as a snapshot of the listing call that
//! produced it, never cached between requests.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-assigned container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new ContainerId from a string.
    ///
    /// Note: This does not validate the format. The engine assigns
    /// container ids, so we trust its format.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened display form (first 12 characters, the
    /// conventional short id).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier for a connected observer (one persistent connection).
///
/// Two connections from the same user are two distinct observers; channel
/// membership and exec sessions are tracked per observer, not per user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(String);

impl ObserverId {
    /// Creates a new ObserverId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates an observer id from a connection sequence number.
    pub fn from_connection(seq: u64) -> Self {
        Self(format!("observer-{seq}"))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live container state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    /// The engine reported a state this gateway does not model.
    Unknown,
}

impl ContainerState {
    /// Parses the engine's state string ("running", "exited", ...).
    ///
    /// Unrecognized values map to `Unknown` rather than failing: the
    /// engine owns its state vocabulary and may grow it.
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// Returns the lowercase label used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One container as returned by a listing call.
///
/// A snapshot, not a cache: every list request fetches fresh data from
/// the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBrief {
    /// Engine-assigned id.
    pub id: ContainerId,

    /// All names the engine knows for this container, in engine order
    /// (each typically carries a leading `/`).
    pub names: Vec<String>,

    /// Image reference the container was created from.
    pub image: String,

    /// Live state at listing time.
    pub state: ContainerState,

    /// Human-readable status line from the engine ("Up 2 hours", ...).
    pub status: String,
}

impl ContainerBrief {
    /// Returns the container's first name with the leading separator
    /// stripped, if it has any name at all.
    pub fn primary_name(&self) -> Option<&str> {
        self.names
            .first()
            .map(|n| n.strip_prefix('/').unwrap_or(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_short() {
        let id = ContainerId::new("0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");

        let tiny = ContainerId::new("abc");
        assert_eq!(tiny.short(), "abc");
    }

    #[test]
    fn test_observer_id_from_connection() {
        let id = ObserverId::from_connection(7);
        assert_eq!(id.as_str(), "observer-7");
    }

    #[test]
    fn test_state_parse_known() {
        assert_eq!(ContainerState::parse("running"), ContainerState::Running);
        assert_eq!(ContainerState::parse("exited"), ContainerState::Exited);
        assert_eq!(ContainerState::parse("paused"), ContainerState::Paused);
        assert_eq!(ContainerState::parse("created"), ContainerState::Created);
    }

    #[test]
    fn test_state_parse_unknown() {
        assert_eq!(ContainerState::parse("removing"), ContainerState::Unknown);
        assert_eq!(ContainerState::parse(""), ContainerState::Unknown);
    }

    #[test]
    fn test_state_serde_label() {
        let json = serde_json::to_string(&ContainerState::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    #[test]
    fn test_primary_name_strips_separator() {
        let brief = ContainerBrief {
            id: ContainerId::new("c1"),
            names: vec!["/web".to_string(), "/compose_web_1".to_string()],
            image: "nginx:latest".to_string(),
            state: ContainerState::Running,
            status: "Up 5 minutes".to_string(),
        };
        assert_eq!(brief.primary_name(), Some("web"));
    }

    #[test]
    fn test_primary_name_empty() {
        let brief = ContainerBrief {
            id: ContainerId::new("c1"),
            names: Vec::new(),
            image: "nginx".to_string(),
            state: ContainerState::Exited,
            status: String::new(),
        };
        assert_eq!(brief.primary_name(), None);
    }
}
