//! Stream actor - owns all channel state and processes commands.
//!
//! The `StreamActor` is the single owner of the channel map. Because it
//! alone mutates that map, create-if-absent on subscribe and
//! destroy-if-empty on the last leave are atomic without locks: no
//! interleaving can produce two engine streams for one key or leave an
//! orphaned stream running.
//!
//! The actor never awaits an engine call. Opening a stream happens in a
//! spawned pump task that feeds chunks back as commands, so a slow
//! engine cannot stall broadcasting on healthy channels.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gangway_core::ObserverId;

use crate::engine::ContainerEngine;

use super::commands::{ChannelKey, StreamCommand, StreamEvent, StreamKind};

/// One live broadcast channel and the token that stops its pump.
///
/// Members are kept ordered by observer id, so every broadcast walks
/// them in the same sequence.
struct StreamChannel {
    members: BTreeMap<ObserverId, mpsc::Sender<StreamEvent>>,
    cancel: CancellationToken,
}

pub struct StreamActor {
    /// Command receiver.
    receiver: mpsc::Receiver<StreamCommand>,

    /// Sender handed to pump tasks so they can feed chunks back.
    self_sender: mpsc::Sender<StreamCommand>,

    engine: Arc<dyn ContainerEngine>,

    /// Live channels keyed by (container, kind).
    channels: HashMap<ChannelKey, StreamChannel>,

    /// Reverse index: which channels each observer belongs to. Makes a
    /// disconnect sweep proportional to the observer's memberships.
    memberships: HashMap<ObserverId, HashSet<ChannelKey>>,
}

impl StreamActor {
    pub fn new(
        receiver: mpsc::Receiver<StreamCommand>,
        self_sender: mpsc::Sender<StreamCommand>,
        engine: Arc<dyn ContainerEngine>,
    ) -> Self {
        Self {
            receiver,
            self_sender,
            engine,
            channels: HashMap::new(),
            memberships: HashMap::new(),
        }
    }

    /// Runs the actor event loop until all handles are dropped.
    pub async fn run(mut self) {
        info!("Stream actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        // Stop any pumps still running.
        for (_, channel) in self.channels.drain() {
            channel.cancel.cancel();
        }
        info!("Stream actor stopped");
    }

    fn handle_command(&mut self, cmd: StreamCommand) {
        match cmd {
            StreamCommand::Subscribe {
                key,
                observer,
                sender,
                respond_to,
            } => {
                self.handle_subscribe(key, observer, sender);
                let _ = respond_to.send(());
            }
            StreamCommand::Unsubscribe { key, observer } => {
                self.handle_unsubscribe(&key, &observer);
            }
            StreamCommand::DisconnectObserver { observer } => {
                self.handle_disconnect(&observer);
            }
            StreamCommand::Chunk { key, data } => {
                self.handle_chunk(&key, data);
            }
            StreamCommand::StreamEnded { key, error } => {
                self.handle_stream_ended(&key, error);
            }
            StreamCommand::ChannelCount { respond_to } => {
                let _ = respond_to.send(self.channels.len());
            }
            StreamCommand::MemberCount { key, respond_to } => {
                let _ = respond_to.send(self.channels.get(&key).map(|c| c.members.len()));
            }
        }
    }

    fn handle_subscribe(
        &mut self,
        key: ChannelKey,
        observer: ObserverId,
        sender: mpsc::Sender<StreamEvent>,
    ) {
        let channel = self.channels.entry(key.clone()).or_insert_with(|| {
            debug!(
                container = %key.container.short(),
                kind = key.kind.as_str(),
                "Creating stream channel"
            );
            let cancel = CancellationToken::new();
            spawn_pump(
                self.engine.clone(),
                self.self_sender.clone(),
                key.clone(),
                cancel.clone(),
            );
            StreamChannel {
                members: BTreeMap::new(),
                cancel,
            }
        });

        // Re-subscribing replaces the member's sender.
        channel.members.insert(observer.clone(), sender);
        self.memberships.entry(observer).or_default().insert(key);
    }

    fn handle_unsubscribe(&mut self, key: &ChannelKey, observer: &ObserverId) {
        let Some(channel) = self.channels.get_mut(key) else {
            return;
        };
        if channel.members.remove(observer).is_none() {
            return;
        }

        if let Some(keys) = self.memberships.get_mut(observer) {
            keys.remove(key);
            if keys.is_empty() {
                self.memberships.remove(observer);
            }
        }

        self.destroy_if_empty(key);
    }

    fn handle_disconnect(&mut self, observer: &ObserverId) {
        let Some(keys) = self.memberships.remove(observer) else {
            return;
        };

        debug!(observer = %observer, channels = keys.len(), "Sweeping disconnected observer");
        for key in keys {
            if let Some(channel) = self.channels.get_mut(&key) {
                channel.members.remove(observer);
                self.destroy_if_empty(&key);
            }
        }
    }

    fn handle_chunk(&mut self, key: &ChannelKey, data: String) {
        let Some(channel) = self.channels.get_mut(key) else {
            // Chunk from a pump that lost the race with destruction.
            return;
        };

        let mut gone = Vec::new();
        for (observer, sender) in &channel.members {
            match sender.try_send(StreamEvent::Chunk {
                key: key.clone(),
                data: data.clone(),
            }) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Backed-up observer: remove it rather than deliver
                    // a gapped stream. A member is either current or
                    // gone, never silently lossy.
                    warn!(observer = %observer, "Observer event queue full, unsubscribing");
                    gone.push(observer.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    gone.push(observer.clone());
                }
            }
        }

        for observer in gone {
            self.handle_unsubscribe(key, &observer);
        }
    }

    /// The pump's stream ended. The registration is removed right away
    /// so a later subscribe opens a fresh engine stream; members are
    /// not notified individually, the channel just stops delivering.
    fn handle_stream_ended(&mut self, key: &ChannelKey, error: Option<String>) {
        let Some(channel) = self.channels.remove(key) else {
            return;
        };

        match &error {
            Some(message) => {
                warn!(
                    container = %key.container.short(),
                    kind = key.kind.as_str(),
                    error = %message,
                    "Stream channel failed, removing registration"
                );
            }
            None => {
                debug!(
                    container = %key.container.short(),
                    kind = key.kind.as_str(),
                    "Stream channel ended"
                );
            }
        }

        for observer in channel.members.keys() {
            if let Some(keys) = self.memberships.get_mut(observer) {
                keys.remove(key);
                if keys.is_empty() {
                    self.memberships.remove(observer);
                }
            }
        }
    }

    fn destroy_if_empty(&mut self, key: &ChannelKey) {
        let empty = self
            .channels
            .get(key)
            .is_some_and(|c| c.members.is_empty());
        if empty {
            if let Some(channel) = self.channels.remove(key) {
                debug!(
                    container = %key.container.short(),
                    kind = key.kind.as_str(),
                    "Destroying empty stream channel"
                );
                channel.cancel.cancel();
            }
        }
    }
}

/// Opens the engine stream for `key` and forwards its chunks back to
/// the actor until the stream ends or the channel is destroyed.
fn spawn_pump(
    engine: Arc<dyn ContainerEngine>,
    sender: mpsc::Sender<StreamCommand>,
    key: ChannelKey,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let opened = match key.kind {
            StreamKind::Logs => engine.log_stream(&key.container).await,
            StreamKind::Stats => engine.stats_stream(&key.container).await,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                let _ = sender
                    .send(StreamCommand::StreamEnded {
                        key,
                        error: Some(e.to_string()),
                    })
                    .await;
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Channel destroyed; dropping the stream closes the
                    // engine side.
                    break;
                }
                item = stream.next() => match item {
                    Some(Ok(data)) => {
                        let chunk = StreamCommand::Chunk {
                            key: key.clone(),
                            data,
                        };
                        if sender.send(chunk).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = sender
                            .send(StreamCommand::StreamEnded {
                                key,
                                error: Some(e.to_string()),
                            })
                            .await;
                        return;
                    }
                    None => {
                        let _ = sender
                            .send(StreamCommand::StreamEnded { key, error: None })
                            .await;
                        return;
                    }
                },
            }
        }
    });
}
