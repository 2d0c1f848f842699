//! Progress output sinks
//!
//! The build reports human-readable progress ("Verifying X...", "Created
//! catalogs/Y...") through an [`OutputSink`]. Nothing is ever read back.

use std::sync::Mutex;

/// One-way channel for progress lines.
pub trait OutputSink: Send + Sync {
    fn output(&self, message: &str);
}

/// Emits progress as `tracing` info events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn output(&self, message: &str) {
        tracing::info!(target: "repocat::progress", "{}", message);
    }
}

/// Prints progress to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn output(&self, message: &str) {
        println!("{message}");
    }
}

/// Buffers progress lines in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl OutputSink for CollectingSink {
    fn output(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
    }
}
