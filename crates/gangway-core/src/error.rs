//! Gateway error taxonomy.
//!
//! Every failure surfaced to an observer falls into one of these
//! categories. Nothing here is fatal to the process: a failure affecting
//! one container or one observer must not affect others.

use crate::action::Action;
use thiserror::Error;

/// Errors surfaced by gateway operations.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// A required field is missing or malformed. Rejected before any
    /// engine call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The authorization gate denied the action. Rejected before any
    /// engine call; no audit record is emitted.
    #[error("permission denied for action '{action}'")]
    PermissionDenied { action: Action },

    /// The demo-mode container ceiling was reached. Rejected before
    /// image resolution.
    #[error("container quota exceeded: {running} running (limit {limit})")]
    QuotaExceeded { limit: usize, running: usize },

    /// The engine rejected or failed the operation (unreachable daemon,
    /// invalid state transition, not found).
    #[error("engine error: {0}")]
    Engine(String),

    /// A live stream failed mid-flight. The registration is removed so a
    /// later subscribe retries with a fresh engine stream.
    #[error("stream error: {0}")]
    Stream(String),
}

impl GatewayError {
    /// Stable machine-readable code carried on wire errors.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::PermissionDenied { .. } => "permission-denied",
            Self::QuotaExceeded { .. } => "quota-exceeded",
            Self::Engine(_) => "engine",
            Self::Stream(_) => "stream",
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
