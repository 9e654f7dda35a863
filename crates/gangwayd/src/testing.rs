//! Test doubles for the daemon's collaborators.
//!
//! Used by unit and integration tests to script engine behavior and
//! observe exactly which calls an operation made.

use crate::audit::AuditSink;
use crate::engine::{ChunkStream, ContainerEngine, EngineError, EngineResult, ShellSession};
use async_trait::async_trait;
use gangway_core::{AuditRecord, ContainerBrief, ContainerId, ContainerState, SpawnPlan};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

/// Per-method call counters.
#[derive(Debug, Default)]
pub struct CallCounters {
    pub list: AtomicUsize,
    pub start: AtomicUsize,
    pub stop: AtomicUsize,
    pub kill: AtomicUsize,
    pub restart: AtomicUsize,
    pub remove: AtomicUsize,
    pub image_exists: AtomicUsize,
    pub pull: AtomicUsize,
    pub create: AtomicUsize,
    pub log_streams: AtomicUsize,
    pub stats_streams: AtomicUsize,
    pub shells: AtomicUsize,
}

/// Feeds one scripted engine stream from a test.
pub struct StreamFeed {
    sender: mpsc::UnboundedSender<EngineResult<String>>,
}

impl StreamFeed {
    /// Pushes one chunk to the consumer. Returns false once the
    /// consumer dropped the stream.
    pub fn push(&self, chunk: impl Into<String>) -> bool {
        self.sender.send(Ok(chunk.into())).is_ok()
    }

    /// Fails the stream from the engine side.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.sender.send(Err(EngineError::Api(message.into())));
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The engine side of a scripted shell session.
pub struct ShellFeed {
    pub output: StreamFeed,
    /// Reads what the gateway wrote to the shell's stdin.
    pub stdin: DuplexStream,
}

/// Scriptable in-memory engine.
///
/// Containers are plain briefs held in a vec; streams and shells are
/// backed by channels the test feeds through the handles returned by
/// `take_feed` / `take_shell`.
#[derive(Default)]
pub struct MockEngine {
    pub calls: CallCounters,
    containers: Mutex<Vec<ContainerBrief>>,
    known_images: Mutex<HashSet<String>>,
    failing_ops: Mutex<HashSet<&'static str>>,
    feeds: Mutex<HashMap<(String, &'static str), StreamFeed>>,
    shells: Mutex<HashMap<String, ShellFeed>>,
    next_id: AtomicU64,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a container the engine will report.
    pub fn add_container(&self, id: &str, name: &str, image: &str, state: ContainerState) {
        self.containers.lock().unwrap().push(ContainerBrief {
            id: ContainerId::new(id),
            names: vec![format!("/{name}")],
            image: image.to_string(),
            state,
            status: String::new(),
        });
    }

    /// Marks an image as already present locally.
    pub fn add_image(&self, image: &str) {
        self.known_images.lock().unwrap().insert(image.to_string());
    }

    /// Makes the named engine method fail until cleared.
    pub fn fail_op(&self, op: &'static str) {
        self.failing_ops.lock().unwrap().insert(op);
    }

    /// Takes the feed handle for an opened log or stats stream.
    pub fn take_feed(&self, id: &str, kind: &'static str) -> Option<StreamFeed> {
        self.feeds.lock().unwrap().remove(&(id.to_string(), kind))
    }

    /// Takes the engine side of an opened shell.
    pub fn take_shell(&self, id: &str) -> Option<ShellFeed> {
        self.shells.lock().unwrap().remove(id)
    }

    fn check_op(&self, op: &'static str) -> EngineResult<()> {
        if self.failing_ops.lock().unwrap().contains(op) {
            Err(EngineError::Api(format!("scripted {op} failure")))
        } else {
            Ok(())
        }
    }

    fn open_feed(&self, id: &str, kind: &'static str) -> ChunkStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds
            .lock()
            .unwrap()
            .insert((id.to_string(), kind), StreamFeed { sender: tx });
        channel_stream(rx)
    }
}

fn channel_stream(mut rx: mpsc::UnboundedReceiver<EngineResult<String>>) -> ChunkStream {
    Box::pin(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)))
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerBrief>> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.check_op("list")?;
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .filter(|c| all || c.state == ContainerState::Running)
            .cloned()
            .collect())
    }

    async fn start_container(&self, _id: &ContainerId) -> EngineResult<()> {
        self.calls.start.fetch_add(1, Ordering::SeqCst);
        self.check_op("start")
    }

    async fn stop_container(&self, _id: &ContainerId) -> EngineResult<()> {
        self.calls.stop.fetch_add(1, Ordering::SeqCst);
        self.check_op("stop")
    }

    async fn kill_container(&self, _id: &ContainerId) -> EngineResult<()> {
        self.calls.kill.fetch_add(1, Ordering::SeqCst);
        self.check_op("kill")
    }

    async fn restart_container(&self, _id: &ContainerId) -> EngineResult<()> {
        self.calls.restart.fetch_add(1, Ordering::SeqCst);
        self.check_op("restart")
    }

    async fn remove_container(&self, _id: &ContainerId) -> EngineResult<()> {
        self.calls.remove.fetch_add(1, Ordering::SeqCst);
        self.check_op("remove")
    }

    async fn image_exists(&self, image: &str) -> EngineResult<bool> {
        self.calls.image_exists.fetch_add(1, Ordering::SeqCst);
        self.check_op("image_exists")?;
        Ok(self.known_images.lock().unwrap().contains(image))
    }

    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        self.calls.pull.fetch_add(1, Ordering::SeqCst);
        self.check_op("pull")?;
        self.known_images.lock().unwrap().insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, plan: &SpawnPlan) -> EngineResult<ContainerId> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.check_op("create")?;
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = ContainerId::new(format!("mock-container-{seq}"));
        self.containers.lock().unwrap().push(ContainerBrief {
            id: id.clone(),
            names: plan
                .name
                .as_ref()
                .map(|n| vec![format!("/{n}")])
                .unwrap_or_default(),
            image: plan.image.clone(),
            state: ContainerState::Running,
            status: String::new(),
        });
        Ok(id)
    }

    async fn log_stream(&self, id: &ContainerId) -> EngineResult<ChunkStream> {
        self.calls.log_streams.fetch_add(1, Ordering::SeqCst);
        self.check_op("logs")?;
        Ok(self.open_feed(id.as_str(), "logs"))
    }

    async fn stats_stream(&self, id: &ContainerId) -> EngineResult<ChunkStream> {
        self.calls.stats_streams.fetch_add(1, Ordering::SeqCst);
        self.check_op("stats")?;
        Ok(self.open_feed(id.as_str(), "stats"))
    }

    async fn open_shell(&self, id: &ContainerId) -> EngineResult<ShellSession> {
        self.calls.shells.fetch_add(1, Ordering::SeqCst);
        self.check_op("shell")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (gateway_side, engine_side) = tokio::io::duplex(4096);
        self.shells.lock().unwrap().insert(
            id.as_str().to_string(),
            ShellFeed {
                output: StreamFeed { sender: tx },
                stdin: engine_side,
            },
        );

        Ok(ShellSession {
            output: channel_stream(rx),
            input: Box::pin(gateway_side),
        })
    }
}

/// Audit sink that keeps records in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> io::Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}
