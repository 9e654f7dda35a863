//! Per-action authorization.
//!
//! Every mutating operation asks the access-control point before the
//! engine is touched. Decisions are evaluated fresh on every call and
//! never cached: a denial or a grant holds for exactly one operation.

use async_trait::async_trait;
use gangway_core::{Action, GatewayError, GatewayResult, ResourceType};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Access-control point consulted once per guarded operation.
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Returns whether `subject` may perform `action` on `resource`.
    ///
    /// An `Err` means the decision point itself failed; callers treat
    /// that as a denial but surface the distinct error.
    async fn check(
        &self,
        subject: &str,
        action: Action,
        resource: ResourceType,
    ) -> GatewayResult<bool>;
}

/// Grant-table policy loaded at startup.
///
/// A grant is either `subject:action` or `subject:*` for all actions.
/// Unlisted pairs are denied.
#[derive(Debug, Default)]
pub struct StaticAccessControl {
    grants: HashSet<(String, Option<Action>)>,
}

impl StaticAccessControl {
    /// Parses grants of the form `subject:action` or `subject:*`,
    /// comma separated. Malformed entries are skipped with a warning.
    pub fn from_grant_list(spec: &str) -> Self {
        let mut grants = HashSet::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((subject, action)) = entry.split_once(':') else {
                warn!(entry = %entry, "Skipping malformed grant");
                continue;
            };
            if action == "*" {
                grants.insert((subject.to_string(), None));
                continue;
            }
            match action.parse::<Action>() {
                Ok(action) => {
                    grants.insert((subject.to_string(), Some(action)));
                }
                Err(e) => warn!(entry = %entry, error = %e, "Skipping grant with unknown action"),
            }
        }
        Self { grants }
    }

    /// Grants `subject` every action.
    pub fn allow_all(subject: &str) -> Self {
        let mut grants = HashSet::new();
        grants.insert((subject.to_string(), None));
        Self { grants }
    }
}

#[async_trait]
impl AccessControl for StaticAccessControl {
    async fn check(
        &self,
        subject: &str,
        action: Action,
        _resource: ResourceType,
    ) -> GatewayResult<bool> {
        let allowed = self.grants.contains(&(subject.to_string(), None))
            || self.grants.contains(&(subject.to_string(), Some(action)));
        debug!(subject = %subject, action = %action, allowed, "Permission check");
        Ok(allowed)
    }
}

/// Runs the check and converts a denial into the error callers return.
pub async fn require(
    access: &dyn AccessControl,
    subject: &str,
    action: Action,
) -> GatewayResult<()> {
    if access.check(subject, action, ResourceType::Container).await? {
        Ok(())
    } else {
        Err(GatewayError::PermissionDenied { action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grant_table_allows_listed_pairs() {
        let access = StaticAccessControl::from_grant_list("alice:start,alice:stop,bob:*");

        assert!(access
            .check("alice", Action::Start, ResourceType::Container)
            .await
            .unwrap());
        assert!(access
            .check("alice", Action::Stop, ResourceType::Container)
            .await
            .unwrap());
        assert!(!access
            .check("alice", Action::Remove, ResourceType::Container)
            .await
            .unwrap());
        assert!(access
            .check("bob", Action::Remove, ResourceType::Container)
            .await
            .unwrap());
        assert!(!access
            .check("carol", Action::Start, ResourceType::Container)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn malformed_grants_are_skipped() {
        let access = StaticAccessControl::from_grant_list("broken, alice:launch, bob:kill ,");

        assert!(!access
            .check("alice", Action::Start, ResourceType::Container)
            .await
            .unwrap());
        assert!(access
            .check("bob", Action::Kill, ResourceType::Container)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn require_maps_denial_to_permission_error() {
        let access = StaticAccessControl::default();

        let err = require(&access, "alice", Action::Spawn).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::PermissionDenied {
                action: Action::Spawn
            }
        ));
    }
}
