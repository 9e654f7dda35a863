//! Client interface for the stream actor.
//!
//! `StreamRegistryHandle` is a cheap-to-clone sender shared by all
//! connection handlers. Channel errors map to
//! `StreamError::ChannelClosed`; fire-and-forget commands ignore them,
//! since a closed actor means the daemon is shutting down anyway.

use gangway_core::{ContainerId, ObserverId};
use tokio::sync::{mpsc, oneshot};

use super::commands::{ChannelKey, StreamCommand, StreamError, StreamEvent, StreamKind};

#[derive(Clone)]
pub struct StreamRegistryHandle {
    sender: mpsc::Sender<StreamCommand>,
}

impl StreamRegistryHandle {
    pub fn new(sender: mpsc::Sender<StreamCommand>) -> Self {
        Self { sender }
    }

    /// Joins a channel, creating it if this is the first member. The
    /// call returns once the membership is registered; chunks arrive on
    /// `sender` as the pump produces them.
    pub async fn subscribe(
        &self,
        key: ChannelKey,
        observer: ObserverId,
        sender: mpsc::Sender<StreamEvent>,
    ) -> Result<(), StreamError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(StreamCommand::Subscribe {
                key,
                observer,
                sender,
                respond_to: tx,
            })
            .await
            .map_err(|_| StreamError::ChannelClosed)?;

        rx.await.map_err(|_| StreamError::ChannelClosed)
    }

    /// Leaves one channel.
    pub async fn unsubscribe(&self, key: ChannelKey, observer: ObserverId) {
        let _ = self
            .sender
            .send(StreamCommand::Unsubscribe { key, observer })
            .await;
    }

    /// Leaves both of a container's channels.
    pub async fn unsubscribe_container(&self, container: &ContainerId, observer: &ObserverId) {
        for kind in [StreamKind::Stats, StreamKind::Logs] {
            self.unsubscribe(
                ChannelKey {
                    container: container.clone(),
                    kind,
                },
                observer.clone(),
            )
            .await;
        }
    }

    /// Removes an observer from every channel it joined.
    pub async fn disconnect(&self, observer: ObserverId) {
        let _ = self
            .sender
            .send(StreamCommand::DisconnectObserver { observer })
            .await;
    }

    /// Number of live channels.
    pub async fn channel_count(&self) -> Result<usize, StreamError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StreamCommand::ChannelCount { respond_to: tx })
            .await
            .map_err(|_| StreamError::ChannelClosed)?;
        rx.await.map_err(|_| StreamError::ChannelClosed)
    }

    /// Member count of one channel, `None` if it does not exist.
    pub async fn member_count(&self, key: ChannelKey) -> Result<Option<usize>, StreamError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StreamCommand::MemberCount {
                key,
                respond_to: tx,
            })
            .await
            .map_err(|_| StreamError::ChannelClosed)?;
        rx.await.map_err(|_| StreamError::ChannelClosed)
    }
}
