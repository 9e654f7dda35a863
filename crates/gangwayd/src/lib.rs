//! Gangway Daemon - Container control gateway
//!
//! This crate provides the core infrastructure for the gangway daemon:
//! - `engine` - Container engine client (Docker via bollard)
//! - `lifecycle` - Lifecycle orchestrator: authorize, one engine call, audit
//! - `streams` - Stream registry actor deduplicating stats/log streams
//! - `exec` - Per-observer interactive exec sessions
//! - `authz` / `audit` - Access-control and audit-sink collaborators
//! - `server` - Unix socket server for observer connections
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      gangwayd daemon                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────────┐      ┌─────────────────────────────┐   │
//! │  │  DaemonServer   │─────▶│   LifecycleOrchestrator     │   │
//! │  │ (Unix socket)   │      │ authorize → engine → audit  │   │
//! │  └────────┬────────┘      └──────────────┬──────────────┘   │
//! │           │ connections                  │                   │
//! │           ▼                              ▼                   │
//! │  ┌─────────────────┐      ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│─────▶│       StreamActor           │   │
//! │  │ (per observer)  │      │ (channel map owner, pumps)  │   │
//! │  └────────┬────────┘      └──────────────┬──────────────┘   │
//! │           │ exec sessions                │ engine streams    │
//! │           ▼                              ▼                   │
//! │  ┌─────────────────┐      ┌─────────────────────────────┐   │
//! │  │ExecSessionMgr   │─────▶│     ContainerEngine         │   │
//! │  │ (per observer)  │      │     (Docker daemon)         │   │
//! │  └─────────────────┘      └─────────────────────────────┘   │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully; a failure affecting
//!   one container or one observer never takes down the daemon

pub mod audit;
pub mod authz;
pub mod config;
pub mod engine;
pub mod exec;
pub mod lifecycle;
pub mod server;
pub mod streams;
pub mod testing;
