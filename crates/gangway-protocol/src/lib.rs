//! Gangway Protocol - Wire protocol for daemon communication
//!
//! This crate provides message types for the persistent per-observer
//! connection between clients and the gangway daemon: request/response
//! actions, event-channel subscriptions, and server-emitted stream events.

pub mod message;
pub mod version;

pub use message::{ClientMessage, DaemonMessage, RequestType};
pub use version::ProtocolVersion;
