//! Structured audit logging for dispatched commands and proxied git traffic.
//!
//! Events flow through a bounded channel to a writer task that appends
//! masked JSONL to the configured sink file, so request handlers never wait
//! on audit I/O. When no sink is configured, events surface as tracing
//! records instead (masked again by the log writer).

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::logging::redact;

/// Roll the sink file over once it grows past this size (50 MB).
const MAX_LOG_BYTES: u64 = 50 * 1024 * 1024;

/// Queue depth between request handlers and the writer task.
const QUEUE_DEPTH: usize = 10_000;

/// Events recorded by the audit log. Fields are shapes and outcomes only,
/// never credential material or raw command output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    CliDispatched {
        tool: String,
        resource: String,
        argv_shape: String,
        exit_code: i32,
        duration_ms: u64,
        via: String,
    },
    CliRejected {
        tool: String,
        resource: String,
        reason: String,
    },
    GitProxied {
        resource: String,
        service: String,
        status: u16,
        duration_ms: u64,
    },
}

impl AuditEvent {
    /// Return the snake_case event name (matches the serde tag).
    pub fn event_name(&self) -> &'static str {
        match self {
            AuditEvent::CliDispatched { .. } => "cli_dispatched",
            AuditEvent::CliRejected { .. } => "cli_rejected",
            AuditEvent::GitProxied { .. } => "git_proxied",
        }
    }
}

/// A single line in the audit JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// RFC 3339 timestamp.
    pub ts: String,
    /// Snake-case event name.
    pub event: String,
    /// Event-specific payload.
    pub data: Value,
}

impl AuditEntry {
    fn record(event: AuditEvent) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            event: event.event_name().to_string(),
            data: serde_json::to_value(&event).unwrap_or(Value::Null),
        }
    }
}

static AUDIT_LOG: OnceLock<AuditLog> = OnceLock::new();

/// Process-wide audit channel; the receiving end lives in the writer task.
pub struct AuditLog {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditLog {
    /// Start the writer task and register the channel. Only the first call
    /// takes effect.
    pub async fn init(path: PathBuf) {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::error!("audit sink directory {} not usable: {e}", dir.display());
                return;
            }
        }

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(writer_task(rx, SinkFile { path }));
        let _ = AUDIT_LOG.set(AuditLog { tx });
    }

    fn push(&self, event: AuditEvent) {
        // Audit must not stall dispatch: on a saturated or closed queue the
        // event is dropped, not awaited.
        if self.tx.try_send(AuditEntry::record(event)).is_err() {
            tracing::warn!("audit queue saturated or closed; event dropped");
        }
    }
}

/// Record an audit event. Goes to the JSONL sink when one was configured,
/// to tracing otherwise.
pub fn audit(event: AuditEvent) {
    match AUDIT_LOG.get() {
        Some(log) => log.push(event),
        None => {
            let line = serde_json::to_string(&AuditEntry::record(event)).unwrap_or_default();
            tracing::info!(target: "audit", "{}", redact::mask(&line));
        }
    }
}

/// Append-only JSONL file that rolls over to `<name>.1` at the size cap.
struct SinkFile {
    path: PathBuf,
}

impl SinkFile {
    fn append(&self, line: &str) -> std::io::Result<()> {
        if self.is_full() {
            fs::rename(&self.path, self.rolled_path())?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        file.sync_all()
    }

    fn is_full(&self) -> bool {
        fs::metadata(&self.path)
            .map(|meta| meta.len() >= MAX_LOG_BYTES)
            .unwrap_or(false)
    }

    fn rolled_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".1");
        PathBuf::from(name)
    }
}

async fn writer_task(mut rx: mpsc::Receiver<AuditEntry>, sink: SinkFile) {
    while let Some(entry) = rx.recv().await {
        let Ok(json) = serde_json::to_string(&entry) else {
            tracing::error!("unserializable audit entry skipped");
            continue;
        };
        if let Err(e) = sink.append(&redact::mask(&json)) {
            tracing::error!("audit append to {} failed: {e}", sink.path.display());
        }
    }
}
