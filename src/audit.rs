//! Append-only audit trail of wallet lifecycle events.
//!
//! Every committed transition and every rejected unlock or backup attempt is
//! recorded. Records never carry secrets or addresses. Sinks receive a copy
//! of each record as it is appended.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleState;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleEvent {
    Restored,
    Created,
    Imported,
    BackupStarted,
    BackupVerified,
    BackupRejected,
    Locked,
    Unlocked,
    UnlockRejected,
    Migrated,
    PasswordChanged,
    Wiped,
}

/// Receives audit records. Implement this to forward records to a file,
/// a database, or a remote collector.
pub trait AuditSink: Send {
    fn append(&mut self, record: AuditRecord);
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event: LifecycleEvent,
    /// State before the event.
    pub from: LifecycleState,
    /// State after the event. Equal to `from` for rejected attempts.
    pub to: LifecycleState,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn now(event: LifecycleEvent, from: LifecycleState, to: LifecycleState) -> Self {
        Self {
            event,
            from,
            to,
            timestamp: Utc::now(),
        }
    }
}

/// In-memory log plus forwarding sinks.
#[derive(Default)]
pub struct AuditLog {
    records: Vec<AuditRecord>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("records", &self.records.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every subsequent record to `sink` as well.
    pub fn add_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    pub fn append(&mut self, record: AuditRecord) {
        for sink in self.sinks.iter_mut() {
            sink.append(record.clone());
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AuditRecord> {
        self.records.iter()
    }

    /// Snapshot of all records so far, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.clone()
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Appends records as JSON lines. Creates the file if needed.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, record: AuditRecord) {
        match serde_json::to_string(&record) {
            Ok(line) => {
                if let Err(e) = writeln!(self.file, "{line}").and_then(|()| self.file.flush()) {
                    tracing::warn!(error = %e, "audit sink write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "audit record not serialisable"),
        }
    }
}
