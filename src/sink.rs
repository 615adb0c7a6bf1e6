//! Audit sink - local record of outgoing telemetry
//!
//! The sink is a collaborator independent of broker delivery: the facade
//! forwards every envelope to it fire-and-forget at publish time, before
//! the envelope is enqueued. Sink failures are logged and never propagate
//! to the caller.
//!
//! Envelopes named `"upload"` are suppressed unconditionally; the facade
//! filters them before any sink sees them, and [`FileSink`] filters again
//! in case it is driven directly.

use crate::protocol::Envelope;
use crate::timeutil::isoformat_ns;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Envelopes with this name never reach a sink.
pub const UPLOAD_NAME: &str = "upload";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink lock poisoned")]
    Poisoned,
}

/// Local audit logging of emitted envelopes.
pub trait AuditSink: Send + Sync {
    fn log(&self, envelope: &Envelope) -> Result<(), SinkError>;
}

/// One audit line: the wire object with the raw `ts` field replaced by a
/// human-readable `timestamp` string at nanosecond precision.
#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    name: &'a str,
    val: i64,
    meta: &'a Map<String, Value>,
    timestamp: String,
}

/// Serialize an envelope as one audit line (without trailing newline).
pub fn audit_record(envelope: &Envelope) -> String {
    let record = AuditRecord {
        name: &envelope.name,
        val: envelope.value,
        meta: &envelope.meta,
        timestamp: isoformat_ns(envelope.timestamp),
    };
    // Flat struct of borrowed fields; serialization cannot fail.
    serde_json::to_string(&record).unwrap_or_default()
}

/// Newline-delimited JSON sink appended to `<dir>/data.ndjson`.
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    /// Open (or create) the audit log under `dir`, appending to any
    /// existing records.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SinkError> {
        let path = dir.as_ref().join("data.ndjson");
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileSink {
    fn log(&self, envelope: &Envelope) -> Result<(), SinkError> {
        if envelope.name == UPLOAD_NAME {
            return Ok(());
        }
        let line = audit_record(envelope);
        let mut file = self.file.lock().map_err(|_| SinkError::Poisoned)?;
        writeln!(file, "{line}")?;
        // Flush per record: the audit log must survive an ungraceful exit
        // even though the publish queue does not.
        file.flush()?;
        Ok(())
    }
}
