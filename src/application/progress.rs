//! Operator-facing progress lines.
//!
//! The pipeline never writes to stdout; it reports through a `ProgressSink`
//! chosen by the caller.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::info;

pub trait ProgressSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Forwards every line to `tracing` at INFO
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn line(&self, line: &str) {
        info!(target: "eps_harvest::progress", "{}", line);
    }
}

/// Streams lines to a UI task
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn line(&self, line: &str) {
        // A closed receiver means nobody is watching; the run goes on.
        let _ = self.tx.send(line.to_string());
    }
}

/// Keeps every line in memory
#[derive(Debug, Default)]
pub struct RecordingProgress {
    lines: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgress {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
