//! Audit sink.
//!
//! Successful mutating actions are recorded here as a side effect. A
//! sink failure is logged and swallowed; it never fails the operation
//! that produced the record.

use async_trait::async_trait;
use gangway_core::AuditRecord;
use std::io;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: AuditRecord) -> io::Result<()>;
}

/// Records an audit entry, logging (and discarding) any sink failure.
pub async fn record(sink: &dyn AuditSink, record: AuditRecord) {
    let action = record.action;
    let target = record.target_id.clone();
    if let Err(e) = sink.append(record).await {
        error!(action = %action, target = %target, error = %e, "Failed to write audit record");
    } else {
        debug!(action = %action, target = %target, "Audit record written");
    }
}

/// Appends records as newline-delimited JSON to a file.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: AuditRecord) -> io::Result<()> {
        let mut line = serde_json::to_string(&record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gangway_core::{Action, ResourceType};
    use tempfile::TempDir;

    #[tokio::test]
    async fn appends_one_json_line_per_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlAuditSink::new(path.clone());

        for target in ["aaa", "bbb"] {
            sink.append(AuditRecord::new(
                "alice",
                Action::Stop,
                ResourceType::Container,
                target,
                None,
            ))
            .await
            .unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.target_id, "aaa");
        assert_eq!(first.action, Action::Stop);
    }

    #[tokio::test]
    async fn record_swallows_sink_failures() {
        // Point at a directory so the open fails.
        let dir = TempDir::new().unwrap();
        let sink = JsonlAuditSink::new(dir.path().to_path_buf());

        // Must not panic or propagate.
        record(
            &sink,
            AuditRecord::new("alice", Action::Kill, ResourceType::Container, "ccc", None),
        )
        .await;
    }
}
