//! Connection handler for individual observer connections.
//!
//! Each observer gets its own handler task that:
//! - Performs protocol version negotiation and takes the subject
//! - Routes requests to the orchestrator, stream registry, and its own
//!   exec session manager
//! - Multiplexes request frames with stream chunks and exec output over
//!   one select loop, so a single task owns the writer
//!
//! Disconnect (graceful or not) always runs the same sweep: every
//! channel membership is removed and every exec session closed, so no
//! engine stream or attachment outlives the observer that wanted it.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gangway_core::{Action, GatewayError, ObserverId};
use gangway_protocol::{ClientMessage, DaemonMessage, ProtocolVersion, RequestType};

use crate::engine::ContainerEngine;
use crate::exec::{ExecEvent, ExecSessionManager};
use crate::lifecycle::LifecycleOrchestrator;
use crate::streams::{ChannelKey, StreamEvent, StreamKind, StreamRegistryHandle};

/// Maximum message size (1 MB)
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Handshake must complete within this window.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffer for stream chunks queued to this observer. An observer that
/// lets it fill is unsubscribed; the channel keeps flowing for others.
const STREAM_EVENT_BUFFER: usize = 128;

/// Buffer for exec output events.
const EXEC_EVENT_BUFFER: usize = 128;

type Reader = FramedRead<OwnedReadHalf, LinesCodec>;
type Writer = BufWriter<OwnedWriteHalf>;

/// Connection handler for a single observer.
pub struct ConnectionHandler {
    stream: UnixStream,
    orchestrator: Arc<LifecycleOrchestrator>,
    streams: StreamRegistryHandle,
    engine: Arc<dyn ContainerEngine>,
    cancel: CancellationToken,
    connection_number: u64,
}

/// What the select loop saw next.
enum Next {
    Shutdown,
    Frame(Option<Result<String, tokio_util::codec::LinesCodecError>>),
    Stream(Option<StreamEvent>),
    Exec(Option<ExecEvent>),
}

/// Whether to keep serving after a request.
#[derive(PartialEq)]
enum Flow {
    Continue,
    Disconnect,
}

impl ConnectionHandler {
    pub fn new(
        stream: UnixStream,
        orchestrator: Arc<LifecycleOrchestrator>,
        streams: StreamRegistryHandle,
        engine: Arc<dyn ContainerEngine>,
        cancel: CancellationToken,
        connection_number: u64,
    ) -> Self {
        Self {
            stream,
            orchestrator,
            streams,
            engine,
            cancel,
            connection_number,
        }
    }

    /// Runs the connection to completion: handshake, serve loop, sweep.
    pub async fn run(self) {
        let ConnectionHandler {
            stream,
            orchestrator,
            streams,
            engine,
            cancel,
            connection_number,
        } = self;

        debug!(connection = connection_number, "New observer connected");

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE),
        );
        let mut writer = BufWriter::new(write_half);

        let subject = match handshake(&mut reader, &mut writer, connection_number).await {
            Ok(subject) => subject,
            Err(e) => {
                warn!(connection = connection_number, error = %e, "Handshake failed");
                return;
            }
        };

        let observer = ObserverId::from_connection(connection_number);
        info!(observer = %observer, subject = %subject, "Observer handshake completed");

        let (stream_tx, mut stream_rx) = mpsc::channel(STREAM_EVENT_BUFFER);
        let (exec_tx, mut exec_rx) = mpsc::channel(EXEC_EVENT_BUFFER);

        let exec = ExecSessionManager::new(
            observer.clone(),
            subject.clone(),
            engine,
            orchestrator.clone(),
            exec_tx,
        );

        let mut session = Session {
            writer,
            orchestrator,
            streams: streams.clone(),
            subject,
            observer: observer.clone(),
            stream_tx,
            exec,
        };

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => Next::Shutdown,
                frame = reader.next() => Next::Frame(frame),
                event = stream_rx.recv() => Next::Stream(event),
                event = exec_rx.recv() => Next::Exec(event),
            };

            match next {
                Next::Shutdown => break,
                Next::Frame(None) => {
                    debug!(observer = %observer, "Observer sent EOF");
                    break;
                }
                Next::Frame(Some(Err(e))) => {
                    warn!(observer = %observer, error = %e, "Frame read failed");
                    break;
                }
                Next::Frame(Some(Ok(line))) => {
                    let outcome = match serde_json::from_str::<ClientMessage>(&line) {
                        Ok(msg) => session.handle_request(msg.request).await,
                        Err(e) => {
                            session
                                .send(DaemonMessage::error(&format!("Parse error: {e}")))
                                .await
                                .map(|()| Flow::Continue)
                        }
                    };
                    match outcome {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Disconnect) => break,
                        Err(e) => {
                            debug!(observer = %observer, error = %e, "Connection closed");
                            break;
                        }
                    }
                }
                Next::Stream(Some(event)) => {
                    if session.forward_stream_event(event).await.is_err() {
                        break;
                    }
                }
                Next::Exec(Some(event)) => {
                    if session.forward_exec_event(event).await.is_err() {
                        break;
                    }
                }
                // Senders live in session/registry handles held right
                // here, so a closed receiver means shutdown.
                Next::Stream(None) | Next::Exec(None) => break,
            }
        }

        // Disconnect sweep: leave every channel and release every exec
        // attachment this observer held.
        streams.disconnect(observer.clone()).await;
        session.exec.close_all();
        info!(observer = %observer, "Observer disconnected");
    }
}

/// State for one connected observer after a successful handshake.
struct Session {
    writer: Writer,
    orchestrator: Arc<LifecycleOrchestrator>,
    streams: StreamRegistryHandle,
    subject: String,
    observer: ObserverId,
    stream_tx: mpsc::Sender<StreamEvent>,
    exec: ExecSessionManager,
}

impl Session {
    async fn handle_request(&mut self, request: RequestType) -> Result<Flow, ConnectionError> {
        match request {
            RequestType::Connect { .. } => {
                self.send(DaemonMessage::error("Already connected")).await?;
            }

            RequestType::ListContainers => {
                match self.orchestrator.list(&self.subject).await {
                    Ok(containers) => {
                        self.send(DaemonMessage::container_list(containers)).await?;
                    }
                    Err(e) => self.send_gateway_error(&e).await?,
                }
            }

            RequestType::StartContainer { id } => {
                match self.orchestrator.start(&self.subject, &id).await {
                    Ok(()) => {
                        self.send(DaemonMessage::action_completed(Action::Start, id))
                            .await?;
                    }
                    Err(e) => self.send_gateway_error(&e).await?,
                }
            }

            RequestType::StopContainer { id } => {
                match self.orchestrator.stop(&self.subject, &id).await {
                    Ok(()) => {
                        self.send(DaemonMessage::action_completed(Action::Stop, id))
                            .await?;
                    }
                    Err(e) => self.send_gateway_error(&e).await?,
                }
            }

            RequestType::KillContainer { id } => {
                match self.orchestrator.kill(&self.subject, &id).await {
                    Ok(()) => {
                        self.send(DaemonMessage::action_completed(Action::Kill, id))
                            .await?;
                    }
                    Err(e) => self.send_gateway_error(&e).await?,
                }
            }

            RequestType::RestartContainer { id } => {
                match self.orchestrator.restart(&self.subject, &id).await {
                    Ok(()) => {
                        self.send(DaemonMessage::action_completed(Action::Restart, id))
                            .await?;
                    }
                    Err(e) => self.send_gateway_error(&e).await?,
                }
            }

            RequestType::RemoveContainer { id } => {
                match self.orchestrator.remove(&self.subject, &id).await {
                    Ok(()) => {
                        self.send(DaemonMessage::action_completed(Action::Remove, id))
                            .await?;
                    }
                    Err(e) => self.send_gateway_error(&e).await?,
                }
            }

            RequestType::SpawnContainer { spec } => {
                match self.orchestrator.spawn(&self.subject, &spec).await {
                    Ok(container_id) => {
                        self.send(DaemonMessage::Spawned { container_id }).await?;
                    }
                    Err(e) => self.send_gateway_error(&e).await?,
                }
            }

            RequestType::CheckPermission { action } => {
                match self.orchestrator.check_permission(&self.subject, action).await {
                    Ok(allowed) => {
                        self.send(DaemonMessage::PermissionResult { action, allowed })
                            .await?;
                    }
                    Err(e) => self.send_gateway_error(&e).await?,
                }
            }

            RequestType::SubscribeToContainer { id } => {
                // Log channels require view-logs; on denial the observer
                // gets an explicit failure and never joins.
                if let Err(e) = self.orchestrator.authorize(&self.subject, Action::ViewLogs).await {
                    self.send(DaemonMessage::subscription_failed(&e.to_string()))
                        .await?;
                    return Ok(Flow::Continue);
                }
                self.join(ChannelKey::logs(id)).await?;
            }

            RequestType::GetContainerStats { id } => {
                self.join(ChannelKey::stats(id)).await?;
            }

            RequestType::UnsubscribeFromContainer { id } => {
                self.streams
                    .unsubscribe_container(&id, &self.observer)
                    .await;
            }

            RequestType::ContainerExec { container_id } => {
                match self.exec.open(container_id).await {
                    Ok(()) => {}
                    Err(GatewayError::Engine(_)) => {
                        // Attach failure: error line plus failure exit.
                        self.send(DaemonMessage::ContainerStdout {
                            output: "[Error opening shell]".to_string(),
                        })
                        .await?;
                        self.send(DaemonMessage::ContainerExit { code: 1 }).await?;
                    }
                    Err(e) => {
                        self.send(DaemonMessage::execution_failed(&e.to_string()))
                            .await?;
                    }
                }
            }

            RequestType::ContainerStdin { input } => {
                self.exec.write_stdin(&input).await;
            }

            RequestType::Disconnect => {
                debug!(observer = %self.observer, "Observer requested disconnect");
                return Ok(Flow::Disconnect);
            }
        }

        Ok(Flow::Continue)
    }

    /// Joins a stream channel, wiring this observer's event queue in.
    async fn join(&mut self, key: ChannelKey) -> Result<(), ConnectionError> {
        if let Err(e) = self
            .streams
            .subscribe(key, self.observer.clone(), self.stream_tx.clone())
            .await
        {
            self.send(DaemonMessage::subscription_failed(&e.to_string()))
                .await?;
        }
        Ok(())
    }

    async fn forward_stream_event(&mut self, event: StreamEvent) -> Result<(), ConnectionError> {
        match event {
            StreamEvent::Chunk { key, data } => {
                let msg = match key.kind {
                    StreamKind::Stats => DaemonMessage::container_stats(key.container, data),
                    StreamKind::Logs => DaemonMessage::container_logs(key.container, data),
                };
                self.send(msg).await
            }
        }
    }

    async fn forward_exec_event(&mut self, event: ExecEvent) -> Result<(), ConnectionError> {
        match event {
            ExecEvent::Output { chunk, .. } => {
                self.send(DaemonMessage::ContainerStdout { output: chunk })
                    .await
            }
            ExecEvent::Exited { container, code } => {
                self.exec.mark_closed(&container);
                self.send(DaemonMessage::ContainerExit { code }).await
            }
        }
    }

    async fn send_gateway_error(&mut self, error: &GatewayError) -> Result<(), ConnectionError> {
        self.send(DaemonMessage::error_with_code(
            &error.to_string(),
            error.code(),
        ))
        .await
    }

    async fn send(&mut self, msg: DaemonMessage) -> Result<(), ConnectionError> {
        send_message(&mut self.writer, msg).await
    }
}

/// Performs the version check and subject handshake.
async fn handshake(
    reader: &mut Reader,
    writer: &mut Writer,
    connection_number: u64,
) -> Result<String, ConnectionError> {
    let frame = match timeout(HANDSHAKE_TIMEOUT, reader.next()).await {
        Ok(Some(Ok(line))) => line,
        Ok(Some(Err(e))) => return Err(ConnectionError::Io(e.to_string())),
        Ok(None) => return Err(ConnectionError::Eof),
        Err(_) => return Err(ConnectionError::Timeout),
    };

    let msg: ClientMessage =
        serde_json::from_str(&frame).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    let client_version = msg.protocol_version;
    if !client_version.is_compatible_with(&ProtocolVersion::CURRENT) {
        warn!(
            client_version = %client_version,
            server_version = %ProtocolVersion::CURRENT,
            "Protocol version mismatch"
        );
        send_message(
            writer,
            DaemonMessage::rejected(&format!(
                "Protocol version {} not compatible with server version {}",
                client_version,
                ProtocolVersion::CURRENT
            )),
        )
        .await?;
        return Err(ConnectionError::VersionMismatch {
            client: client_version,
            server: ProtocolVersion::CURRENT,
        });
    }

    match msg.request {
        RequestType::Connect { subject } if !subject.trim().is_empty() => {
            let observer = ObserverId::from_connection(connection_number);
            send_message(writer, DaemonMessage::connected(observer.as_str())).await?;
            Ok(subject)
        }
        RequestType::Connect { .. } => {
            send_message(writer, DaemonMessage::rejected("Missing subject")).await?;
            Err(ConnectionError::MissingSubject)
        }
        other => {
            send_message(
                writer,
                DaemonMessage::rejected("Expected connect message for handshake"),
            )
            .await?;
            Err(ConnectionError::UnexpectedMessage(format!("{other:?}")))
        }
    }
}

/// Writes one newline-delimited JSON message.
async fn send_message(writer: &mut Writer, msg: DaemonMessage) -> Result<(), ConnectionError> {
    let json =
        serde_json::to_string(&msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Connect message carried no subject")]
    MissingSubject,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Handshake timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::VersionMismatch {
            client: ProtocolVersion::new(2, 0),
            server: ProtocolVersion::new(1, 0),
        };
        assert!(err.to_string().contains("2.0"));
        assert!(err.to_string().contains("1.0"));
    }
}
