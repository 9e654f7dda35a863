//! Unix socket server for the gateway daemon.
//!
//! The server:
//! - Listens on a Unix socket for observer connections
//! - Spawns a ConnectionHandler for each observer
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │                 │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌───────────────────────┐
//! │ConnectionHandler│────▶│ LifecycleOrchestrator │
//! │  (per observer) │     ├───────────────────────┤
//! └─────────────────┘     │ StreamRegistryHandle  │
//!         │               ├───────────────────────┤
//!         │               │ ExecSessionManager    │
//!         ▼               └───────────────────────┘
//!   observer transport
//! ```
//!
//! One observer failing, disconnecting, or misbehaving never affects
//! another: each connection runs in its own task and owns its own exec
//! sessions and event queue.

mod connection;

pub use connection::{ConnectionError, ConnectionHandler};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::ContainerEngine;
use crate::lifecycle::LifecycleOrchestrator;
use crate::streams::StreamRegistryHandle;

/// Unix socket server for the gateway daemon.
pub struct DaemonServer {
    /// Path to the Unix socket
    socket_path: PathBuf,

    orchestrator: Arc<LifecycleOrchestrator>,
    streams: StreamRegistryHandle,
    engine: Arc<dyn ContainerEngine>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating observer IDs
    connection_counter: AtomicU64,
}

impl DaemonServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        orchestrator: Arc<LifecycleOrchestrator>,
        streams: StreamRegistryHandle,
        engine: Arc<dyn ContainerEngine>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            orchestrator,
            streams,
            engine,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the server.
    ///
    /// Listens for connections until the cancellation token is
    /// triggered. This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        // Remove a stale socket file from a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ServerError::SocketSetup {
                    path: self.socket_path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;

        info!(
            socket = %self.socket_path.display(),
            "Gateway server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Keep accepting other connections
                        }
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    /// Spawns a handler task for a new observer connection.
    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_number: u64) {
        let handler = ConnectionHandler::new(
            stream,
            self.orchestrator.clone(),
            self.streams.clone(),
            self.engine.clone(),
            self.cancel_token.clone(),
            connection_number,
        );

        tokio::spawn(handler.run());
    }

    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }
        info!("Server cleanup complete");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::SocketSetup {
            path: PathBuf::from("/tmp/test.sock"),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/tmp/test.sock"));
        assert!(err.to_string().contains("permission denied"));
    }
}
