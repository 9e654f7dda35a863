//! Audit records.
//!
//! Produced as a side effect of successful mutating actions and handed to
//! the audit sink. Append-only; storage and query belong to the sink, not
//! this gateway.

use crate::action::{Action, ResourceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Subject that performed the action.
    pub actor: String,

    /// What was done.
    pub action: Action,

    /// Resource type the action applied to.
    pub resource_type: ResourceType,

    /// Engine id of the affected container.
    pub target_id: String,

    /// Extra context (image reference for spawns, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// When the action succeeded.
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Creates a record timestamped now.
    pub fn new(
        actor: impl Into<String>,
        action: Action,
        resource_type: ResourceType,
        target_id: impl Into<String>,
        detail: Option<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            action,
            resource_type,
            target_id: target_id.into(),
            detail,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes() {
        let record = AuditRecord::new(
            "alice",
            Action::Start,
            ResourceType::Container,
            "abc123",
            None,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"actor\":\"alice\""));
        assert!(json.contains("\"action\":\"start\""));
        assert!(json.contains("\"target_id\":\"abc123\""));
        // detail is omitted when absent
        assert!(!json.contains("detail"));
    }

    #[test]
    fn test_record_with_detail() {
        let record = AuditRecord::new(
            "bob",
            Action::Spawn,
            ResourceType::Container,
            "def456",
            Some("image=nginx:latest".to_string()),
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("image=nginx:latest"));
    }
}
