//! Plain append-mode file sink.

use std::path::Path;

use crate::entry::LogEntry;
use crate::transport::{FileTransport, Transport};

use super::{Sink, SinkCore};

/// Writes each formatted entry as one line to a file. Parent directories
/// are created on first write; an open failure logs to stderr and the
/// sink keeps trying on subsequent writes.
pub struct FileSink {
    core: SinkCore,
    transport: FileTransport,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileSink {
            core: SinkCore::new(),
            transport: FileTransport::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.transport.path()
    }
}

impl Sink for FileSink {
    fn core(&self) -> &SinkCore {
        &self.core
    }

    fn write(&self, entry: &LogEntry) {
        self.transport.write(&self.core.format(entry));
    }

    fn flush(&self) {
        self.transport.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;
    use tempfile::tempdir;

    #[test]
    fn test_writes_formatted_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let sink = FileSink::new(&path);

        sink.write(&LogEntry::new(LogLevel::Info, "hello"));
        sink.write(&LogEntry::new(LogLevel::Warn, "careful"));
        sink.flush();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[INFO] hello"));
        assert!(lines[1].contains("[WARN] careful"));
    }
}
