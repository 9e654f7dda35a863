//! Gangway Core - Shared types for the container gateway
//!
//! This crate provides the domain types shared between the daemon
//! (gangwayd) and its wire protocol: container identities and live state,
//! spawn specifications, the enumerated action set, system-container
//! filtering, and audit records.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod action;
pub mod audit;
pub mod container;
pub mod error;
pub mod spawn;
pub mod system;

// Re-exports for convenience
pub use action::{Action, ResourceType};
pub use audit::AuditRecord;
pub use container::{ContainerBrief, ContainerId, ContainerState, ObserverId};
pub use error::{GatewayError, GatewayResult};
pub use spawn::{PortMapping, SpawnPlan, SpawnSpec, VolumeMapping};
pub use system::SystemAllowList;
