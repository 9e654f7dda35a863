//! Stream registry commands, errors, and member events.
//!
//! Message types for communicating with the `StreamActor`: commands sent
//! by connection handlers and pump tasks, and the events fanned out to
//! channel members.

use gangway_core::{ContainerId, ObserverId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The two stream flavors a container channel can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stats,
    Logs,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stats => "stats",
            StreamKind::Logs => "logs",
        }
    }
}

/// Identity of one broadcast channel: a container crossed with a kind.
///
/// At most one live channel exists per key; a second subscriber joins
/// the existing channel instead of opening another engine stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub container: ContainerId,
    pub kind: StreamKind,
}

impl ChannelKey {
    pub fn stats(container: ContainerId) -> Self {
        Self {
            container,
            kind: StreamKind::Stats,
        }
    }

    pub fn logs(container: ContainerId) -> Self {
        Self {
            container,
            kind: StreamKind::Logs,
        }
    }
}

/// Event delivered to a channel member's connection task.
///
/// A dying channel delivers nothing special: its registration is
/// removed and the member simply stops receiving chunks until it
/// re-subscribes.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// One chunk from the underlying engine stream.
    Chunk { key: ChannelKey, data: String },
}

/// Errors surfaced by the stream registry handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The actor has shut down.
    #[error("stream registry channel closed")]
    ChannelClosed,
}

/// Commands sent to the stream actor.
///
/// Subscribe and the introspection commands carry a oneshot for the
/// response; the rest are fire-and-forget. `Chunk` and `StreamEnded`
/// come from pump tasks, not from connection handlers.
#[derive(Debug)]
pub enum StreamCommand {
    /// Join a channel, creating it (and its engine stream) if absent.
    Subscribe {
        key: ChannelKey,
        observer: ObserverId,
        sender: mpsc::Sender<StreamEvent>,
        respond_to: oneshot::Sender<()>,
    },

    /// Leave a channel. The channel is destroyed when its last member
    /// leaves.
    Unsubscribe {
        key: ChannelKey,
        observer: ObserverId,
    },

    /// Remove an observer from every channel it is a member of.
    DisconnectObserver { observer: ObserverId },

    /// One chunk read by a pump task.
    Chunk { key: ChannelKey, data: String },

    /// A pump task's stream ended, with an error message if it failed.
    StreamEnded {
        key: ChannelKey,
        error: Option<String>,
    },

    /// Number of live channels (used by tests and introspection).
    ChannelCount { respond_to: oneshot::Sender<usize> },

    /// Number of members in one channel, `None` if the channel is gone.
    MemberCount {
        key: ChannelKey,
        respond_to: oneshot::Sender<Option<usize>>,
    },
}
