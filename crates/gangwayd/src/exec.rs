//! Interactive exec sessions.
//!
//! One manager lives inside each connection handler, so sessions are
//! keyed by container alone; the observer is fixed. A session is never
//! shared between observers, and a closed session is never resumed:
//! reopening is a brand-new attach.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use gangway_core::{Action, ContainerId, GatewayError, GatewayResult, ObserverId};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::ContainerEngine;
use crate::lifecycle::LifecycleOrchestrator;

/// Session lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Requested,
    Authorizing,
    Attaching,
    Open,
    Closed,
}

/// Event from a session's reader task to the connection loop.
#[derive(Debug)]
pub enum ExecEvent {
    /// One output chunk from the shell, forwarded without batching.
    Output {
        container: ContainerId,
        chunk: String,
    },

    /// The engine-side stream finished. `code` is 0 for a clean end,
    /// 1 when the stream failed.
    Exited { container: ContainerId, code: i32 },
}

struct ExecSession {
    state: ExecState,
    stdin: Option<Pin<Box<dyn AsyncWrite + Send>>>,
    cancel: CancellationToken,
}

pub struct ExecSessionManager {
    observer: ObserverId,
    subject: String,
    engine: Arc<dyn ContainerEngine>,
    orchestrator: Arc<LifecycleOrchestrator>,
    events: mpsc::Sender<ExecEvent>,
    sessions: HashMap<ContainerId, ExecSession>,
}

impl ExecSessionManager {
    pub fn new(
        observer: ObserverId,
        subject: String,
        engine: Arc<dyn ContainerEngine>,
        orchestrator: Arc<LifecycleOrchestrator>,
        events: mpsc::Sender<ExecEvent>,
    ) -> Self {
        Self {
            observer,
            subject,
            engine,
            orchestrator,
            events,
            sessions: HashMap::new(),
        }
    }

    /// Drives a new session through authorize and attach. On success
    /// the session is `Open`: output flows through the event channel
    /// and stdin can be written. Denials and attach failures leave the
    /// session `Closed` with no resources held.
    pub async fn open(&mut self, container: ContainerId) -> GatewayResult<()> {
        if let Some(existing) = self.sessions.get(&container) {
            if existing.state != ExecState::Closed {
                return Err(GatewayError::Stream(format!(
                    "exec session already open for container {}",
                    container.short()
                )));
            }
        }

        // Requested -> Authorizing: denial closes the session with no
        // engine call made.
        if let Err(e) = self.orchestrator.authorize(&self.subject, Action::Exec).await {
            self.store_closed(container);
            return Err(e);
        }

        // Authorizing -> Attaching: attach failure closes the session.
        let shell = match self.engine.open_shell(&container).await {
            Ok(shell) => shell,
            Err(e) => {
                self.store_closed(container);
                return Err(e.into());
            }
        };
        debug!(observer = %self.observer, container = %container.short(), "Exec session attached");

        // Attaching -> Open.
        let cancel = CancellationToken::new();
        spawn_reader(container.clone(), shell.output, self.events.clone(), cancel.clone());

        self.sessions.insert(
            container,
            ExecSession {
                state: ExecState::Open,
                stdin: Some(shell.input),
                cancel,
            },
        );
        Ok(())
    }

    /// Writes observer input to every open session's stdin, verbatim.
    /// Sessions that already closed ignore the input.
    pub async fn write_stdin(&mut self, input: &str) {
        let mut broken = Vec::new();
        for (container, session) in &mut self.sessions {
            if session.state != ExecState::Open {
                continue;
            }
            let Some(stdin) = session.stdin.as_mut() else {
                continue;
            };
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                warn!(container = %container.short(), error = %e, "Exec stdin write failed");
                broken.push(container.clone());
            }
        }
        for container in broken {
            self.close(&container);
        }
    }

    /// Marks a session closed after its reader reported an exit.
    pub fn mark_closed(&mut self, container: &ContainerId) {
        self.close(container);
    }

    /// Closes every session. Called on observer disconnect; dropping
    /// stdin and cancelling the reader releases the engine attachment.
    pub fn close_all(&mut self) {
        let containers: Vec<_> = self.sessions.keys().cloned().collect();
        for container in containers {
            self.close(&container);
        }
    }

    /// Session state, for introspection.
    pub fn state(&self, container: &ContainerId) -> Option<ExecState> {
        self.sessions.get(container).map(|s| s.state)
    }

    fn close(&mut self, container: &ContainerId) {
        if let Some(session) = self.sessions.get_mut(container) {
            if session.state != ExecState::Closed {
                debug!(container = %container.short(), "Exec session closed");
            }
            session.state = ExecState::Closed;
            session.stdin = None;
            session.cancel.cancel();
        }
    }

    fn store_closed(&mut self, container: ContainerId) {
        self.sessions.insert(
            container,
            ExecSession {
                state: ExecState::Closed,
                stdin: None,
                cancel: CancellationToken::new(),
            },
        );
    }
}

/// Forwards shell output to the connection loop until the stream ends
/// or the session is cancelled.
fn spawn_reader(
    container: ContainerId,
    mut output: crate::engine::ChunkStream,
    events: mpsc::Sender<ExecEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Disconnect path: drop the stream, no notification.
                    return;
                }
                item = output.next() => match item {
                    Some(Ok(chunk)) => {
                        let event = ExecEvent::Output {
                            container: container.clone(),
                            chunk,
                        };
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(container = %container.short(), error = %e, "Exec stream failed");
                        let _ = events
                            .send(ExecEvent::Exited { container, code: 1 })
                            .await;
                        return;
                    }
                    None => {
                        let _ = events
                            .send(ExecEvent::Exited { container, code: 0 })
                            .await;
                        return;
                    }
                },
            }
        }
    });
}
