//! Notifier implementations that ship with the crate

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use super::errors::NotifyError;
use super::Notifier;

/// Writes one log line per message. Bodies are never logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        if !to.contains('@') {
            return Err(NotifyError::InvalidRecipient(to.to_string()));
        }
        tracing::info!(to, subject, "notification sent");
        Ok(())
    }
}

/// One line of an outbox file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Appends every message, body included, as a JSON line to a local file.
///
/// Stands in for a mail transport where the operator collects messages
/// out-of-band, e.g. a reset link requested from the CLI.
#[derive(Debug)]
pub struct OutboxNotifier {
    path: PathBuf,
    write: Mutex<()>,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads back every entry written so far.
    pub fn entries(&self) -> Result<Vec<OutboxEntry>, NotifyError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(NotifyError::Delivery(format!("cannot read outbox: {}", e))),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| NotifyError::Delivery(format!("bad outbox line: {}", e)))
            })
            .collect()
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if !to.contains('@') {
            return Err(NotifyError::InvalidRecipient(to.to_string()));
        }

        let entry = OutboxEntry {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&entry)
            .map_err(|e| NotifyError::Delivery(format!("cannot encode message: {}", e)))?;
        line.push('\n');

        let _guard = self.write.lock();
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .map_err(|e| NotifyError::Delivery(format!("cannot create outbox directory: {}", e)))?;
            }
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|e| NotifyError::Delivery(format!("cannot write outbox: {}", e)))?;

        tracing::info!(to, subject, outbox = %self.path.display(), "notification written to outbox");
        Ok(())
    }
}

/// A captured message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every message in memory. Can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    arrived: Condvar,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent sends fail (after recording nothing).
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Messages received so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Blocks until at least `count` messages arrived or `timeout` passed.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<SentMessage> {
        let deadline = Instant::now() + timeout;
        let mut sent = self.sent.lock();
        while sent.len() < count {
            if self.arrived.wait_until(&mut sent, deadline).timed_out() {
                break;
            }
        }
        sent.clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if *self.failing.lock() {
            return Err(NotifyError::Delivery("recording notifier set to fail".to_string()));
        }
        self.sent.lock().push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        self.arrived.notify_all();
        Ok(())
    }
}
