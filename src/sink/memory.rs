//! In-memory capture sink, used by tests and as a null-like destination.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::entry::LogEntry;

use super::{Sink, SinkCore};

#[derive(Default)]
struct Captured {
    entries: Vec<LogEntry>,
    lines: Vec<String>,
}

/// Captures every accepted entry (and its formatted line) in memory.
/// [`MemorySink::handle`] returns a view that stays readable after the
/// sink has been moved into a logger.
pub struct MemorySink {
    core: SinkCore,
    captured: Arc<Mutex<Captured>>,
}

/// Shared read view over a [`MemorySink`]'s captured output.
#[derive(Clone)]
pub struct MemoryHandle {
    captured: Arc<Mutex<Captured>>,
}

impl MemoryHandle {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.captured.lock().entries.clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.captured.lock().lines.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.captured
            .lock()
            .entries
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.captured.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captured.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        let mut captured = self.captured.lock();
        captured.entries.clear();
        captured.lines.clear();
    }
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink {
            core: SinkCore::new(),
            captured: Arc::new(Mutex::new(Captured::default())),
        }
    }

    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            captured: Arc::clone(&self.captured),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.captured.lock().entries.clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.captured.lock().lines.clone()
    }

    pub fn len(&self) -> usize {
        self.captured.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captured.lock().entries.is_empty()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        MemorySink::new()
    }
}

impl Sink for MemorySink {
    fn write(&self, entry: &LogEntry) {
        let line = self.core.format(entry);
        let mut captured = self.captured.lock();
        captured.lines.push(line);
        captured.entries.push(entry.clone());
    }

    fn core(&self) -> &SinkCore {
        &self.core
    }
}
