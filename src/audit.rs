//! Audit Logger
//!
//! Append-only event sink for the execution pipeline. In asynchronous mode
//! entries go through a bounded queue drained by a single consumer thread;
//! a full queue drops the entry rather than blocking the request path. In
//! synchronous mode entries are written inline.
//!
//! Entries are serialized as JSON lines into per-day partitions
//! (`audit_YYYY-MM-DD.log`). Write failures are swallowed - the audit
//! trail is best-effort and must never affect the primary result.

use crate::config::Config;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::warn;

/// Bound on the async event queue; overflow drops, never blocks
const QUEUE_CAPACITY: usize = 1000;

/// One append-only audit record
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub query_id: String,
    pub event_type: String,
    pub data: serde_json::Value,
}

/// Sync-or-async audit event sink
pub struct AuditLogger {
    enabled: bool,
    async_mode: bool,
    sink: Arc<FileSink>,
    sender: Mutex<Option<Sender<AuditEntry>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLogger {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_queue_capacity(config, QUEUE_CAPACITY)
    }

    /// Constructor with an explicit queue bound, used by tests
    pub fn with_queue_capacity(config: Arc<Config>, capacity: usize) -> Self {
        let sink = Arc::new(FileSink::new(PathBuf::from(&config.audit.storage.path)));
        let enabled = config.audit.enabled;
        let async_mode = config.performance.async_processing;

        if enabled {
            if let Err(e) = std::fs::create_dir_all(&config.audit.storage.path) {
                warn!(error = %e, path = %config.audit.storage.path, "failed to create audit directory");
            }
        }

        let mut logger = AuditLogger {
            enabled,
            async_mode,
            sink,
            sender: Mutex::new(None),
            consumer: Mutex::new(None),
        };

        if enabled && async_mode {
            logger.start_consumer(capacity);
        }

        logger
    }

    fn start_consumer(&mut self, capacity: usize) {
        let (tx, rx) = bounded::<AuditEntry>(capacity);
        let sink = Arc::clone(&self.sink);

        let handle = std::thread::Builder::new()
            .name("audit-consumer".to_string())
            .spawn(move || {
                // Runs until every sender is dropped, then drains naturally
                for entry in rx {
                    sink.write(&entry);
                }
            })
            .ok();

        *self.sender.lock() = Some(tx);
        *self.consumer.lock() = handle;
    }

    /// Record one event; no-op when auditing is disabled
    ///
    /// Asynchronous mode never blocks: a full queue silently drops the
    /// entry. Synchronous mode writes inline.
    pub fn log_event(&self, query_id: &str, event_type: &str, data: serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = AuditEntry {
            timestamp: Utc::now(),
            query_id: query_id.to_string(),
            event_type: event_type.to_string(),
            data,
        };

        if self.async_mode {
            let sender = self.sender.lock();
            if let Some(tx) = sender.as_ref() {
                match tx.try_send(entry) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(event_type, "audit queue full, dropping entry");
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            }
        } else {
            self.sink.write(&entry);
        }
    }

    /// Stop the consumer after it drains the queue; idempotent
    pub fn close(&self) {
        // Dropping the only sender ends the consumer's receive loop once
        // the queued entries are written.
        let sender = self.sender.lock().take();
        drop(sender);

        let handle = self.consumer.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("audit consumer panicked during shutdown");
            }
        }
    }
}

/// Per-day JSON-line file sink
struct FileSink {
    dir: PathBuf,
    // Serializes appends across producer threads
    write_lock: Mutex<()>,
}

impl FileSink {
    fn new(dir: PathBuf) -> Self {
        FileSink {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    fn write(&self, entry: &AuditEntry) {
        let _guard = self.write_lock.lock();

        let day = entry.timestamp.format("%Y-%m-%d");
        let path = self.dir.join(format!("audit_{day}.log"));

        let file = OpenOptions::new().create(true).append(true).open(&path);
        let mut file = match file {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "audit write failed");
                return;
            }
        };

        match serde_json::to_vec(entry) {
            Ok(mut line) => {
                line.push(b'\n');
                if let Err(e) = file.write_all(&line) {
                    warn!(error = %e, "audit append failed");
                }
            }
            Err(e) => warn!(error = %e, "audit entry serialization failed"),
        }
    }
}
