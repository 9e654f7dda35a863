//! Protocol message types for daemon communication.

use crate::version::ProtocolVersion;
use gangway_core::{Action, ContainerBrief, ContainerId, SpawnSpec};
use serde::{Deserialize, Serialize};

/// Requests an observer can send over its persistent connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestType {
    /// Observer handshake. Carries the authenticated subject asserted by
    /// the identity layer in front of this gateway.
    Connect {
        /// Subject on whose behalf all actions are authorized.
        subject: String,
    },

    /// List all non-system containers.
    ListContainers,

    /// Start a stopped container.
    StartContainer { id: ContainerId },

    /// Stop a running container.
    StopContainer { id: ContainerId },

    /// Kill a running container.
    KillContainer { id: ContainerId },

    /// Restart a container.
    RestartContainer { id: ContainerId },

    /// Force-remove a container.
    RemoveContainer { id: ContainerId },

    /// Create and start a new container from a spawn spec.
    SpawnContainer { spec: SpawnSpec },

    /// Probe whether the subject may perform an action on containers.
    CheckPermission { action: Action },

    /// Join the container's log channel (opens the engine log stream on
    /// first subscriber). Requires view-logs permission.
    SubscribeToContainer { id: ContainerId },

    /// Leave all of the container's channels.
    UnsubscribeFromContainer { id: ContainerId },

    /// Join the container's stats channel (opens the engine stats stream
    /// on first subscriber).
    GetContainerStats { id: ContainerId },

    /// Open an interactive shell session in the container.
    ContainerExec { container_id: ContainerId },

    /// Input bytes for the observer's open exec sessions.
    ContainerStdin { input: String },

    /// Observer disconnecting gracefully.
    Disconnect,
}

/// Messages sent from observer to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Request payload
    #[serde(flatten)]
    pub request: RequestType,
}

impl ClientMessage {
    /// Creates a new client message with the current protocol version.
    pub fn new(request: RequestType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            request,
        }
    }

    /// Creates a connect message.
    pub fn connect(subject: impl Into<String>) -> Self {
        Self::new(RequestType::Connect {
            subject: subject.into(),
        })
    }

    /// Creates a list request.
    pub fn list_containers() -> Self {
        Self::new(RequestType::ListContainers)
    }

    /// Creates a spawn request.
    pub fn spawn(spec: SpawnSpec) -> Self {
        Self::new(RequestType::SpawnContainer { spec })
    }

    /// Creates a log-channel subscription request.
    pub fn subscribe(id: ContainerId) -> Self {
        Self::new(RequestType::SubscribeToContainer { id })
    }

    /// Creates an unsubscribe request.
    pub fn unsubscribe(id: ContainerId) -> Self {
        Self::new(RequestType::UnsubscribeFromContainer { id })
    }

    /// Creates a stats-channel subscription request.
    pub fn stats(id: ContainerId) -> Self {
        Self::new(RequestType::GetContainerStats { id })
    }

    /// Creates an exec request.
    pub fn exec(container_id: ContainerId) -> Self {
        Self::new(RequestType::ContainerExec { container_id })
    }

    /// Creates a stdin message.
    pub fn stdin(input: impl Into<String>) -> Self {
        Self::new(RequestType::ContainerStdin {
            input: input.into(),
        })
    }

    /// Creates a disconnect message.
    pub fn disconnect() -> Self {
        Self::new(RequestType::Disconnect)
    }
}

/// Messages sent from daemon to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Connection accepted.
    Connected {
        /// Daemon's protocol version
        protocol_version: ProtocolVersion,
        /// Assigned observer id
        observer_id: String,
    },

    /// Connection rejected (version mismatch, missing subject).
    Rejected {
        /// Reason for rejection
        reason: String,
        /// Daemon's protocol version (for the client to upgrade)
        protocol_version: ProtocolVersion,
    },

    /// Listing response, system containers already filtered out.
    ContainerList { containers: Vec<ContainerBrief> },

    /// A lifecycle action succeeded.
    ActionCompleted {
        action: Action,
        container_id: ContainerId,
    },

    /// A spawn succeeded; carries the newly created id.
    Spawned { container_id: ContainerId },

    /// Answer to a permission probe.
    PermissionResult { action: Action, allowed: bool },

    /// One stats chunk from the container's stats channel.
    ContainerStats {
        container_id: ContainerId,
        stats: String,
    },

    /// One log chunk from the container's log channel.
    ContainerLogs {
        container_id: ContainerId,
        chunk: String,
    },

    /// Output from the observer's exec session.
    ContainerStdout { output: String },

    /// The exec session terminated (0 = engine stream ended, 1 = failure).
    ContainerExit { code: i32 },

    /// A channel subscription was refused.
    SubscriptionFailed { message: String },

    /// An exec request was refused.
    ExecutionFailed { message: String },

    /// Error response to a request.
    Error {
        /// Error message
        message: String,
        /// Stable taxonomy code (optional)
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    /// Creates a connected response.
    pub fn connected(observer_id: impl Into<String>) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            observer_id: observer_id.into(),
        }
    }

    /// Creates a rejected response.
    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    /// Creates a listing response.
    pub fn container_list(containers: Vec<ContainerBrief>) -> Self {
        Self::ContainerList { containers }
    }

    /// Creates an action-completed response.
    pub fn action_completed(action: Action, container_id: ContainerId) -> Self {
        Self::ActionCompleted {
            action,
            container_id,
        }
    }

    /// Creates a stats event.
    pub fn container_stats(container_id: ContainerId, stats: impl Into<String>) -> Self {
        Self::ContainerStats {
            container_id,
            stats: stats.into(),
        }
    }

    /// Creates a log event.
    pub fn container_logs(container_id: ContainerId, chunk: impl Into<String>) -> Self {
        Self::ContainerLogs {
            container_id,
            chunk: chunk.into(),
        }
    }

    /// Creates a subscription-failure notification.
    pub fn subscription_failed(message: &str) -> Self {
        Self::SubscriptionFailed {
            message: message.to_string(),
        }
    }

    /// Creates an execution-failure notification.
    pub fn execution_failed(message: &str) -> Self {
        Self::ExecutionFailed {
            message: message.to_string(),
        }
    }

    /// Creates an error response.
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    /// Creates an error response with a taxonomy code.
    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }
}
