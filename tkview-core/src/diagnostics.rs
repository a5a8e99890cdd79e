//! Diagnostic sinks.
//!
//! RTOS providers report what they skip or degrade through a [`DiagnosticSink`]
//! handed to them at construction, so the host decides where messages go and
//! tests can assert on them.

use log::Level;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Log target used by [`LogSink`].
pub const LOG_TARGET: &str = "tkview::rtos";

/// Receiver for provider diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, level: Level, args: fmt::Arguments<'_>);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: LOG_TARGET, level, "{args}");
    }
}

/// Keeps every diagnostic in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<(Level, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn records(&self) -> Vec<(Level, String)> {
        self.records
            .lock()
            .map_or_else(|_| Vec::new(), |records| records.clone())
    }

    /// Whether any record at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle))
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        if let Ok(mut records) = self.records.lock() {
            records.push((level, args.to_string()));
        }
    }
}
