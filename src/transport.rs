//! Byte-level writers used by the text sinks. A transport receives a
//! fully-formatted line and appends the trailing newline.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Writes formatted entries to a destination.
pub trait Transport: Send + Sync {
    fn write(&self, line: &str);

    fn flush(&self) {}
}

/// Process-global mutex serializing stdout/stderr output so multiple
/// console sinks cannot interleave lines.
static CONSOLE_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, Default)]
pub struct StdoutTransport;

impl Transport for StdoutTransport {
    fn write(&self, line: &str) {
        let _guard = CONSOLE_MUTEX.lock();
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = writeln!(handle, "{}", line);
        let _ = handle.flush();
    }
}

#[derive(Debug, Default)]
pub struct StderrTransport;

impl Transport for StderrTransport {
    fn write(&self, line: &str) {
        let _guard = CONSOLE_MUTEX.lock();
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(handle, "{}", line);
        let _ = handle.flush();
    }
}

/// Append-mode file writer. The file (and its parent directories) are
/// created on first write; an open failure is reported to stderr and the
/// next write retries, best-effort.
pub struct FileTransport {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FileTransport {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileTransport {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> std::io::Result<BufWriter<File>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BufWriter::new(file))
    }
}

impl Transport for FileTransport {
    fn write(&self, line: &str) {
        let mut writer = self.writer.lock();
        if writer.is_none() {
            match Self::open(&self.path) {
                Ok(w) => *writer = Some(w),
                Err(err) => {
                    eprintln!("lunar-log: failed to open {}: {}", self.path.display(), err);
                    return;
                }
            }
        }
        if let Some(w) = writer.as_mut() {
            if writeln!(w, "{}", line).and_then(|_| w.flush()).is_err() {
                // Drop the writer so the next write reopens.
                *writer = None;
            }
        }
    }

    fn flush(&self) {
        if let Some(w) = self.writer.lock().as_mut() {
            let _ = w.flush();
        }
    }
}
