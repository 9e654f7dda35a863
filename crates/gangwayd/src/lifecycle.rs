//! Container lifecycle orchestration.
//!
//! Every operation follows the same discipline: authorize first, touch
//! the engine exactly once (spawn being the scripted exception), and
//! audit only after the engine reported success. The orchestrator holds
//! no container state of its own; the engine is the source of truth.

use crate::audit::{self, AuditSink};
use crate::authz::{self, AccessControl};
use crate::engine::ContainerEngine;
use gangway_core::{
    Action, AuditRecord, ContainerBrief, ContainerId, GatewayError, GatewayResult, ResourceType,
    SpawnSpec, SystemAllowList,
};
use std::sync::Arc;
use tracing::info;

pub struct LifecycleOrchestrator {
    engine: Arc<dyn ContainerEngine>,
    access: Arc<dyn AccessControl>,
    audit: Arc<dyn AuditSink>,
    system: SystemAllowList,
    /// Running-container quota, enforced only in demo mode.
    demo_quota: Option<usize>,
}

impl LifecycleOrchestrator {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        access: Arc<dyn AccessControl>,
        audit: Arc<dyn AuditSink>,
        system: SystemAllowList,
        demo_quota: Option<usize>,
    ) -> Self {
        Self {
            engine,
            access,
            audit,
            system,
            demo_quota,
        }
    }

    /// Checks a permission without performing anything. The decision is
    /// evaluated fresh; nothing is cached for later calls.
    pub async fn check_permission(&self, subject: &str, action: Action) -> GatewayResult<bool> {
        self.access
            .check(subject, action, ResourceType::Container)
            .await
    }

    /// Authorizes a non-lifecycle action (log viewing, exec) for the
    /// caller, failing with a permission error on denial.
    pub async fn authorize(&self, subject: &str, action: Action) -> GatewayResult<()> {
        authz::require(self.access.as_ref(), subject, action).await
    }

    /// Lists all containers, with system containers filtered out.
    /// Reads are not audited.
    pub async fn list(&self, subject: &str) -> GatewayResult<Vec<ContainerBrief>> {
        authz::require(self.access.as_ref(), subject, Action::List).await?;
        let containers = self.engine.list_containers(true).await?;
        Ok(containers
            .into_iter()
            .filter(|c| !self.system.is_system(c))
            .collect())
    }

    pub async fn start(&self, subject: &str, id: &ContainerId) -> GatewayResult<()> {
        authz::require(self.access.as_ref(), subject, Action::Start).await?;
        self.engine.start_container(id).await?;
        self.audit_success(subject, Action::Start, id, None).await;
        Ok(())
    }

    pub async fn stop(&self, subject: &str, id: &ContainerId) -> GatewayResult<()> {
        authz::require(self.access.as_ref(), subject, Action::Stop).await?;
        self.engine.stop_container(id).await?;
        self.audit_success(subject, Action::Stop, id, None).await;
        Ok(())
    }

    pub async fn kill(&self, subject: &str, id: &ContainerId) -> GatewayResult<()> {
        authz::require(self.access.as_ref(), subject, Action::Kill).await?;
        self.engine.kill_container(id).await?;
        self.audit_success(subject, Action::Kill, id, None).await;
        Ok(())
    }

    pub async fn restart(&self, subject: &str, id: &ContainerId) -> GatewayResult<()> {
        authz::require(self.access.as_ref(), subject, Action::Restart).await?;
        self.engine.restart_container(id).await?;
        self.audit_success(subject, Action::Restart, id, None).await;
        Ok(())
    }

    pub async fn remove(&self, subject: &str, id: &ContainerId) -> GatewayResult<()> {
        authz::require(self.access.as_ref(), subject, Action::Remove).await?;
        self.engine.remove_container(id).await?;
        self.audit_success(subject, Action::Remove, id, None).await;
        Ok(())
    }

    /// Creates and starts a container from a spawn request.
    ///
    /// Order matters: validation and authorization happen before any
    /// engine call, and the demo quota is checked before the image is
    /// pulled so a denied spawn costs nothing.
    pub async fn spawn(&self, subject: &str, spec: &SpawnSpec) -> GatewayResult<ContainerId> {
        let plan = spec.validate()?;
        authz::require(self.access.as_ref(), subject, Action::Spawn).await?;

        if let Some(limit) = self.demo_quota {
            let running = self.engine.list_containers(false).await?;
            let occupied = running.iter().filter(|c| !self.system.is_system(c)).count();
            if occupied >= limit {
                return Err(GatewayError::QuotaExceeded {
                    limit,
                    running: occupied,
                });
            }
        }

        if !self.engine.image_exists(&plan.image).await? {
            info!(image = %plan.image, "Image not present locally, pulling");
            self.engine.pull_image(&plan.image).await?;
        }

        let id = self.engine.create_container(&plan).await?;
        self.engine.start_container(&id).await?;

        info!(container = %id.short(), image = %plan.image, "Container spawned");
        self.audit_success(
            subject,
            Action::Spawn,
            &id,
            Some(format!("image {}", plan.image)),
        )
        .await;

        Ok(id)
    }

    async fn audit_success(
        &self,
        subject: &str,
        action: Action,
        id: &ContainerId,
        detail: Option<String>,
    ) {
        audit::record(
            self.audit.as_ref(),
            AuditRecord::new(
                subject,
                action,
                ResourceType::Container,
                id.as_str(),
                detail,
            ),
        )
        .await;
    }
}
