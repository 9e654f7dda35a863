//! The enumerated action set.
//!
//! Every operation the gateway can perform is one of these variants, and
//! authorization is evaluated on the (subject, action, resource type)
//! triple. Using an enum instead of free-form strings closes off typos and
//! unauthorized action categories at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An action a subject may be permitted to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    List,
    Start,
    Stop,
    Kill,
    Restart,
    Remove,
    Spawn,
    ViewLogs,
    Exec,
}

impl Action {
    /// Returns the kebab-case wire/policy label for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Kill => "kill",
            Self::Restart => "restart",
            Self::Remove => "remove",
            Self::Spawn => "spawn",
            Self::ViewLogs => "view-logs",
            Self::Exec => "exec",
        }
    }

    /// True for actions that change engine state (and are audited on
    /// success). Observing actions are authorized but not audited.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Start | Self::Stop | Self::Kill | Self::Restart | Self::Remove | Self::Spawn
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown action label.
#[derive(Debug, Clone, Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Self::List),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "kill" => Ok(Self::Kill),
            "restart" => Ok(Self::Restart),
            "remove" => Ok(Self::Remove),
            "spawn" => Ok(Self::Spawn),
            "view-logs" => Ok(Self::ViewLogs),
            "exec" => Ok(Self::Exec),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Resource type an action applies to.
///
/// The gateway's own scope only covers containers; the variant exists so
/// policy decisions and audit records carry an explicit resource type
/// instead of an implied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Container,
}

impl ResourceType {
    /// Returns the policy-facing label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "Container",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_labels_roundtrip() {
        for action in [
            Action::List,
            Action::Start,
            Action::Stop,
            Action::Kill,
            Action::Restart,
            Action::Remove,
            Action::Spawn,
            Action::ViewLogs,
            Action::Exec,
        ] {
            let parsed: Action = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = "reboot".parse::<Action>().unwrap_err();
        assert!(err.to_string().contains("reboot"));
    }

    #[test]
    fn test_mutating_partition() {
        assert!(Action::Start.is_mutating());
        assert!(Action::Remove.is_mutating());
        assert!(Action::Spawn.is_mutating());
        assert!(!Action::List.is_mutating());
        assert!(!Action::ViewLogs.is_mutating());
        assert!(!Action::Exec.is_mutating());
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&Action::ViewLogs).unwrap();
        assert_eq!(json, "\"view-logs\"");
        let back: Action = serde_json::from_str("\"view-logs\"").unwrap();
        assert_eq!(back, Action::ViewLogs);
    }
}
