//! Console sinks (plain and ANSI-colored).

use std::sync::atomic::{AtomicBool, Ordering};

use colored::{Color, Colorize};
use is_terminal::IsTerminal;

use crate::entry::LogEntry;
use crate::level::LogLevel;
use crate::transport::{StderrTransport, StdoutTransport, Transport};

use super::{Sink, SinkCore};

/// Which console stream a sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Stdout,
    Stderr,
}

/// Plain console sink. Human-readable formatter by default; writes are
/// serialized with every other console sink through the process-global
/// console mutex.
pub struct ConsoleSink {
    core: SinkCore,
    transport: Box<dyn Transport>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        ConsoleSink::on(ConsoleStream::Stdout)
    }

    pub fn on(stream: ConsoleStream) -> Self {
        ConsoleSink {
            core: SinkCore::new(),
            transport: make_transport(stream),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        ConsoleSink::new()
    }
}

impl Sink for ConsoleSink {
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

fn make_transport(stream: ConsoleStream) -> Box<dyn Transport> {
    match stream {
        ConsoleStream::Stdout => Box::new(StdoutTransport),
        ConsoleStream::Stderr => Box::new(StderrTransport),
    }
}

/// ANSI-colored console sink: colorizes the `[LEVEL]` bracket, leaving
/// the message body untouched.
///
/// Color is auto-disabled when the stream is not a terminal, when
/// `NO_COLOR` is set (any value), or when `LUNAR_LOG_NO_COLOR` is
/// non-empty.
pub struct ColorConsoleSink {
    core: SinkCore,
    transport: Box<dyn Transport>,
    color_enabled: AtomicBool,
}

impl ColorConsoleSink {
    pub fn new() -> Self {
        ColorConsoleSink::on(ConsoleStream::Stdout)
    }

    pub fn on(stream: ConsoleStream) -> Self {
        ColorConsoleSink {
            core: SinkCore::new(),
            transport: make_transport(stream),
            color_enabled: AtomicBool::new(detect_color_support(stream)),
        }
    }

    /// Override color auto-detection. Forcing color on also sets the
    /// process-wide color override so escape codes are emitted even when
    /// the stream is not a terminal.
    pub fn set_color(&self, enabled: bool) {
        if enabled {
            colored::control::set_override(true);
        }
        self.color_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_color_enabled(&self) -> bool {
        self.color_enabled.load(Ordering::Relaxed)
    }

    /// Insert color codes around the first `[LEVEL]` bracket. Text
    /// without the bracket is returned unchanged.
    pub fn colorize(text: &str, level: LogLevel) -> String {
        let bracket = format!("[{}]", level.as_str());
        match text.find(&bracket) {
            Some(pos) => {
                let colored_bracket = match level {
                    LogLevel::Trace => bracket.dimmed(),
                    LogLevel::Debug => bracket.color(Color::Cyan),
                    LogLevel::Info => bracket.color(Color::Green),
                    LogLevel::Warn => bracket.color(Color::Yellow),
                    LogLevel::Error => bracket.color(Color::Red),
                    LogLevel::Fatal => bracket.color(Color::Red).bold(),
                };
                let mut out = String::with_capacity(text.len() + 16);
                out.push_str(&text[..pos]);
                out.push_str(&colored_bracket.to_string());
                out.push_str(&text[pos + bracket.len()..]);
                out
            }
            None => text.to_string(),
        }
    }
}

impl Default for ColorConsoleSink {
    fn default() -> Self {
        ColorConsoleSink::new()
    }
}

impl Sink for ColorConsoleSink {
    fn core(&self) -> &SinkCore {
        &self.core
    }

    fn write(&self, entry: &LogEntry) {
        let mut formatted = self.core.format(entry);
        if self.color_enabled.load(Ordering::Relaxed) {
            formatted = Self::colorize(&formatted, entry.level);
        }
        self.transport.write(&formatted);
    }

    fn flush(&self) {
        self.transport.flush();
    }
}

fn detect_color_support(stream: ConsoleStream) -> bool {
    // https://no-color.org/: any value disables.
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if let Some(v) = std::env::var_os("LUNAR_LOG_NO_COLOR") {
        if !v.is_empty() {
            return false;
        }
    }
    match stream {
        ConsoleStream::Stdout => std::io::stdout().is_terminal(),
        ConsoleStream::Stderr => std::io::stderr().is_terminal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colorize_targets_first_bracket() {
        colored::control::set_override(true);
        let out = ColorConsoleSink::colorize("12:00 [ERROR] failed [ERROR]", LogLevel::Error);
        assert!(out.contains("\u{1b}["));
        // The second occurrence stays plain.
        assert!(out.ends_with("failed [ERROR]"));
        colored::control::unset_override();
    }

    #[test]
    fn test_colorize_without_bracket_is_identity() {
        let out = ColorConsoleSink::colorize("no bracket here", LogLevel::Info);
        assert_eq!(out, "no bracket here");
    }
}
