// Append-only audit trail.
//
// The log file is opened once at startup and receives one line per event:
// `[ISO-8601 UTC timestamp] [LEVEL] message`. Appends are serialized behind
// a mutex so concurrent requests never interleave partial lines. Entries are
// mirrored to the tracing output at the matching level.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditLevel::Info => write!(f, "INFO"),
            AuditLevel::Warn => write!(f, "WARN"),
            AuditLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Handle to the process-wide audit log.
///
/// Cheap to clone; all clones append to the same file.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<Mutex<File>>,
}

impl AuditLog {
    /// Open (or create) the audit log in append mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create audit log directory {parent:?}"))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit log {path:?}"))?;
        Ok(Self {
            sink: Arc::new(Mutex::new(file)),
        })
    }

    /// Append one entry. Each entry is written as a single line under the
    /// sink lock, so concurrent appends never interleave.
    pub fn record(&self, level: AuditLevel, message: &str) {
        match level {
            AuditLevel::Info => tracing::info!("{message}"),
            AuditLevel::Warn => tracing::warn!("{message}"),
            AuditLevel::Error => tracing::error!("{message}"),
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format!("[{timestamp}] [{level}] {message}\n");
        match self.sink.lock() {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    tracing::error!("failed to append audit entry: {e}");
                }
            }
            Err(_) => tracing::error!("audit log lock poisoned, entry dropped"),
        }
    }

    pub fn info(&self, message: &str) {
        self.record(AuditLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.record(AuditLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.record(AuditLevel::Error, message);
    }

    /// Flush buffered OS state to disk. Called at shutdown.
    pub fn flush(&self) {
        if let Ok(file) = self.sink.lock() {
            if let Err(e) = file.sync_all() {
                tracing::error!("failed to flush audit log: {e}");
            }
        }
    }
}
