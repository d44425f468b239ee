//! POSIX syslog sink.
//!
//! Uses the libc `openlog`/`syslog`/`closelog` API. `openlog` is
//! process-global and most libc implementations keep the ident pointer
//! without copying, so the ident lives in a process-global buffer guarded
//! by a mutex, with a refcount deciding when `closelog` runs. One
//! instance per process is recommended; additional instances overwrite
//! the shared ident and trigger a stderr warning.

#![cfg(unix)]

use std::ffi::CString;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::entry::LogEntry;
use crate::level::LogLevel;

use super::{Sink, SinkCore};

const MAX_IDENT_LEN: usize = 255;

struct IdentState {
    // NUL-terminated; address is stable for the process lifetime.
    buf: [libc::c_char; MAX_IDENT_LEN + 1],
    refcount: usize,
}

static IDENT: Lazy<Mutex<IdentState>> = Lazy::new(|| {
    Mutex::new(IdentState {
        buf: [0; MAX_IDENT_LEN + 1],
        refcount: 0,
    })
});

/// Syslog configuration.
#[derive(Debug, Clone, Copy)]
pub struct SyslogOptions {
    /// syslog facility (`libc::LOG_USER`, `libc::LOG_LOCAL0`, …).
    pub facility: libc::c_int,
    /// `openlog` options (`libc::LOG_PID`, `libc::LOG_NDELAY`, …).
    pub logopt: libc::c_int,
    /// Prefix messages with `[LEVEL] `.
    pub include_level: bool,
}

impl Default for SyslogOptions {
    fn default() -> Self {
        SyslogOptions {
            facility: libc::LOG_USER,
            logopt: libc::LOG_PID | libc::LOG_NDELAY,
            include_level: false,
        }
    }
}

impl SyslogOptions {
    pub fn facility(mut self, facility: libc::c_int) -> Self {
        self.facility = facility;
        self
    }

    pub fn logopt(mut self, logopt: libc::c_int) -> Self {
        self.logopt = logopt;
        self
    }

    pub fn include_level(mut self, include: bool) -> Self {
        self.include_level = include;
        self
    }
}

/// Sink writing to the local syslog daemon.
pub struct SyslogSink {
    core: SinkCore,
    opts: SyslogOptions,
}

impl SyslogSink {
    /// `ident` is the syslog identity string (typically the program
    /// name), copied into the process-global buffer and truncated to 255
    /// bytes.
    pub fn new(ident: &str) -> Self {
        SyslogSink::with_options(ident, SyslogOptions::default())
    }

    pub fn with_options(ident: &str, opts: SyslogOptions) -> Self {
        let mut state = IDENT.lock();
        if state.refcount > 0 {
            eprintln!(
                "lunar-log: multiple syslog sinks detected; openlog() is process-global \
                 and the last-created instance's ident wins"
            );
        }
        state.refcount += 1;

        let bytes = ident.as_bytes();
        if bytes.len() > MAX_IDENT_LEN {
            eprintln!(
                "lunar-log: syslog ident {:?} truncated to {} bytes",
                ident, MAX_IDENT_LEN
            );
        }
        let len = bytes.len().min(MAX_IDENT_LEN);
        for (i, b) in bytes[..len].iter().enumerate() {
            state.buf[i] = *b as libc::c_char;
        }
        state.buf[len] = 0;

        unsafe {
            libc::openlog(state.buf.as_ptr(), opts.logopt, opts.facility);
        }

        SyslogSink {
            core: SinkCore::new(),
            opts,
        }
    }

    /// Facility-independent severity mapping: TRACE and DEBUG map to
    /// DEBUG, INFO to INFO, WARN to WARNING, ERROR to ERR, FATAL to CRIT.
    pub fn priority_for(level: LogLevel) -> libc::c_int {
        match level {
            LogLevel::Trace | LogLevel::Debug => libc::LOG_DEBUG,
            LogLevel::Info => libc::LOG_INFO,
            LogLevel::Warn => libc::LOG_WARNING,
            LogLevel::Error => libc::LOG_ERR,
            LogLevel::Fatal => libc::LOG_CRIT,
        }
    }
}

impl Sink for SyslogSink {
    fn core(&self) -> &SinkCore {
        &self.core
    }

    fn write(&self, entry: &LogEntry) {
        let priority = Self::priority_for(entry.level);

        // Build the message outside the lock to minimize contention.
        let text = if self.opts.include_level {
            format!("[{}] {}", entry.level.as_str(), entry.message)
        } else {
            entry.message.clone()
        };
        let message = match CString::new(text) {
            Ok(c) => c,
            Err(_) => match CString::new(entry.message.replace('\0', " ")) {
                Ok(c) => c,
                Err(_) => return,
            },
        };

        // syslog() reads the global ident on every call; serialize
        // against concurrent construction/teardown.
        let _guard = IDENT.lock();
        unsafe {
            libc::syslog(priority, b"%s\0".as_ptr() as *const libc::c_char, message.as_ptr());
        }
    }
}

impl Drop for SyslogSink {
    fn drop(&mut self) {
        let mut state = IDENT.lock();
        state.refcount -= 1;
        if state.refcount == 0 {
            unsafe {
                libc::closelog();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_mapping() {
        assert_eq!(SyslogSink::priority_for(LogLevel::Trace), libc::LOG_DEBUG);
        assert_eq!(SyslogSink::priority_for(LogLevel::Debug), libc::LOG_DEBUG);
        assert_eq!(SyslogSink::priority_for(LogLevel::Info), libc::LOG_INFO);
        assert_eq!(SyslogSink::priority_for(LogLevel::Warn), libc::LOG_WARNING);
        assert_eq!(SyslogSink::priority_for(LogLevel::Error), libc::LOG_ERR);
        assert_eq!(SyslogSink::priority_for(LogLevel::Fatal), libc::LOG_CRIT);
    }
}
