//! Container engine client surface.
//!
//! The gateway talks to the container runtime exclusively through the
//! `ContainerEngine` trait. The production implementation wraps the Docker
//! API ([`docker::DockerEngine`]); tests substitute a scripted engine and
//! count calls.

mod docker;

pub use docker::DockerEngine;

use async_trait::async_trait;
use futures::stream::BoxStream;
use gangway_core::{ContainerBrief, ContainerId, GatewayError, SpawnPlan};
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncWrite;

/// Errors reported by the engine client.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine daemon could not be reached.
    #[error("engine unreachable: {0}")]
    Unavailable(String),

    /// The referenced container or image does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other engine-side failure (invalid state transition, API
    /// error, mid-stream failure).
    #[error("{0}")]
    Api(String),
}

impl From<EngineError> for GatewayError {
    fn from(err: EngineError) -> Self {
        GatewayError::Engine(err.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A live stream of text chunks (log lines, stats JSON documents) from
/// the engine. Ends when the engine closes it; yields an error item on
/// mid-stream failure.
pub type ChunkStream = BoxStream<'static, EngineResult<String>>;

/// An interactive engine-attached shell: output chunks plus a writable
/// stdin. Dropping the session closes the engine-side attachment.
pub struct ShellSession {
    /// Shell output, forwarded to the observer verbatim.
    pub output: ChunkStream,

    /// Shell stdin; observer input bytes are written here verbatim.
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}

/// The engine operations this gateway consumes.
///
/// One method per engine primitive; the orchestrator issues exactly one
/// call per lifecycle action. All methods take `&self`: implementations
/// are internally synchronized and shared via `Arc`.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Lists containers; `all` includes stopped ones.
    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerBrief>>;

    /// Starts a stopped container.
    async fn start_container(&self, id: &ContainerId) -> EngineResult<()>;

    /// Stops a running container.
    async fn stop_container(&self, id: &ContainerId) -> EngineResult<()>;

    /// Kills a running container.
    async fn kill_container(&self, id: &ContainerId) -> EngineResult<()>;

    /// Restarts a container.
    async fn restart_container(&self, id: &ContainerId) -> EngineResult<()>;

    /// Force-removes a container.
    async fn remove_container(&self, id: &ContainerId) -> EngineResult<()>;

    /// Probes whether an image exists locally.
    async fn image_exists(&self, image: &str) -> EngineResult<bool>;

    /// Pulls an image, blocking until the pull completes or fails.
    async fn pull_image(&self, image: &str) -> EngineResult<()>;

    /// Creates a container from a validated spawn plan and returns the
    /// engine-assigned id. Does not start it.
    async fn create_container(&self, plan: &SpawnPlan) -> EngineResult<ContainerId>;

    /// Opens a following log stream (stdout + stderr, from the start).
    async fn log_stream(&self, id: &ContainerId) -> EngineResult<ChunkStream>;

    /// Opens a continuous stats stream; each chunk is one stats document
    /// as JSON text.
    async fn stats_stream(&self, id: &ContainerId) -> EngineResult<ChunkStream>;

    /// Opens an interactive `/bin/sh` session attached to the container.
    async fn open_shell(&self, id: &ContainerId) -> EngineResult<ShellSession>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_maps_to_gateway_taxonomy() {
        let err: GatewayError = EngineError::NotFound("abc".to_string()).into();
        assert!(matches!(err, GatewayError::Engine(_)));
        assert_eq!(err.code(), "engine");
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "engine unreachable: connection refused");
    }
}
