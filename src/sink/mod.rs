//! Sink framework: the `Sink` trait and the filter/formatter state shared
//! by every sink.

pub mod async_sink;
pub mod batched;
pub mod console;
pub mod file;
pub mod http;
pub mod memory;
pub mod rolling;
#[cfg(unix)]
pub mod syslog;

pub use async_sink::{AsyncOptions, AsyncSink, OverflowPolicy};
pub use batched::{BatchDelivery, BatchOptions, BatchedSink};
pub use console::{ColorConsoleSink, ConsoleSink, ConsoleStream};
pub use file::FileSink;
pub use http::{HttpDelivery, HttpSink, HttpSinkOptions};
pub use memory::{MemoryHandle, MemorySink};
pub use rolling::{RollInterval, RollingFileSink, RollingPolicy};
#[cfg(unix)]
pub use syslog::{SyslogOptions, SyslogSink};

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::entry::LogEntry;
use crate::filter::{eval_predicate, FilterPredicate, FilterRule};
use crate::format::{display_message, Formatter, HumanReadableFormatter};
use crate::level::LogLevel;

/// Terminal delivery component. Implementations own their formatter (via
/// [`SinkCore`]) and transport, and may add worker threads (async,
/// batched).
///
/// `write` is invoked by the logger's consumer thread after the per-sink
/// filter chain has accepted the entry. A panicking `write` is caught by
/// the consumer; one bad sink cannot starve the others.
pub trait Sink: Send + Sync {
    fn core(&self) -> &SinkCore;

    fn write(&self, entry: &LogEntry);

    fn flush(&self) {}
}

/// Per-sink state shared by all sink implementations: identity, filter
/// chain, formatter, and locale override.
pub struct SinkCore {
    name: Mutex<String>,
    min_level: AtomicU8,
    predicate: Mutex<Option<FilterPredicate>>,
    rules: Mutex<Vec<FilterRule>>,
    only_tags: Mutex<Vec<String>>,
    except_tags: Mutex<Vec<String>>,
    locale: Mutex<Option<String>>,
    formatter: Mutex<Box<dyn Formatter>>,
}

impl SinkCore {
    pub fn new() -> Self {
        SinkCore::with_formatter(Box::new(HumanReadableFormatter::new()))
    }

    pub fn with_formatter(formatter: Box<dyn Formatter>) -> Self {
        SinkCore {
            name: Mutex::new(String::new()),
            min_level: AtomicU8::new(LogLevel::Trace as u8),
            predicate: Mutex::new(None),
            rules: Mutex::new(Vec::new()),
            only_tags: Mutex::new(Vec::new()),
            except_tags: Mutex::new(Vec::new()),
            locale: Mutex::new(None),
            formatter: Mutex::new(formatter),
        }
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.lock() = name.to_string();
    }

    pub fn min_level(&self) -> LogLevel {
        LogLevel::from_index(self.min_level.load(Ordering::Relaxed))
    }

    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn set_predicate(&self, predicate: FilterPredicate) {
        *self.predicate.lock() = Some(predicate);
    }

    pub fn clear_predicate(&self) {
        *self.predicate.lock() = None;
    }

    pub fn add_rule(&self, rule: FilterRule) {
        self.rules.lock().push(rule);
    }

    /// Add a batch of rules atomically.
    pub fn add_rules(&self, rules: Vec<FilterRule>) {
        self.rules.lock().extend(rules);
    }

    pub fn clear_rules(&self) {
        self.rules.lock().clear();
    }

    /// Clear predicate and rules. Tag filters are separate; see
    /// [`SinkCore::clear_tag_filters`].
    pub fn clear_filters(&self) {
        self.clear_predicate();
        self.clear_rules();
    }

    pub fn add_only_tag(&self, tag: &str) {
        let mut tags = self.only_tags.lock();
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    pub fn add_except_tag(&self, tag: &str) {
        let mut tags = self.except_tags.lock();
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    pub fn clear_tag_filters(&self) {
        self.only_tags.lock().clear();
        self.except_tags.lock().clear();
    }

    pub fn set_locale(&self, locale: &str) {
        *self.locale.lock() = Some(locale.to_string());
    }

    pub fn locale(&self) -> Option<String> {
        self.locale.lock().clone()
    }

    pub(crate) fn set_formatter(&self, formatter: Box<dyn Formatter>) {
        *self.formatter.lock() = formatter;
    }

    /// Format an entry for this sink, re-rendering the message when the
    /// sink's locale override differs from the entry's.
    pub fn format(&self, entry: &LogEntry) -> String {
        let locale = self.locale.lock().clone();
        let fmt = self.formatter.lock();
        match locale {
            Some(loc) if loc != entry.locale => {
                let mut localized = entry.clone();
                localized.message = display_message(entry, Some(&loc));
                localized.locale = loc;
                fmt.format(&localized)
            }
            _ => fmt.format(entry),
        }
    }

    /// Per-sink filter composition: tag routing → min level → predicate →
    /// DSL rules (AND). Returns true if the entry should be written.
    pub fn accepts(&self, entry: &LogEntry) -> bool {
        {
            let only = self.only_tags.lock();
            if !only.is_empty() && !entry.tags.iter().any(|t| only.contains(t)) {
                return false;
            }
        }
        {
            let except = self.except_tags.lock();
            if entry.tags.iter().any(|t| except.contains(t)) {
                return false;
            }
        }

        if entry.level < self.min_level() {
            return false;
        }

        if let Some(pred) = self.predicate.lock().as_ref() {
            if !eval_predicate(pred, entry) {
                return false;
            }
        }

        self.rules.lock().iter().all(|rule| rule.evaluate(entry))
    }
}

impl Default for SinkCore {
    fn default() -> Self {
        SinkCore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tagged(tags: &[&str]) -> LogEntry {
        let mut e = LogEntry::new(LogLevel::Info, "msg");
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        e
    }

    #[test]
    fn test_tag_routing_only() {
        let core = SinkCore::new();
        core.add_only_tag("auth");

        assert!(core.accepts(&tagged(&["auth"])));
        assert!(core.accepts(&tagged(&["auth", "db"])));
        assert!(!core.accepts(&tagged(&["db"])));
        // Untagged entries are rejected by a non-empty only set.
        assert!(!core.accepts(&tagged(&[])));
    }

    #[test]
    fn test_tag_routing_except() {
        let core = SinkCore::new();
        core.add_except_tag("health");

        assert!(core.accepts(&tagged(&[])));
        assert!(core.accepts(&tagged(&["auth"])));
        assert!(!core.accepts(&tagged(&["health"])));
        assert!(!core.accepts(&tagged(&["auth", "health"])));
    }

    #[test]
    fn test_min_level_gate() {
        let core = SinkCore::new();
        core.set_min_level(LogLevel::Warn);
        assert!(!core.accepts(&LogEntry::new(LogLevel::Info, "x")));
        assert!(core.accepts(&LogEntry::new(LogLevel::Error, "x")));
    }

    #[test]
    fn test_predicate_and_rules_compose() {
        let core = SinkCore::new();
        core.set_predicate(Arc::new(|e| !e.message.contains("skip")));
        core.add_rule(FilterRule::parse("level >= INFO").unwrap());

        assert!(core.accepts(&LogEntry::new(LogLevel::Info, "keep")));
        assert!(!core.accepts(&LogEntry::new(LogLevel::Info, "skip this")));
        assert!(!core.accepts(&LogEntry::new(LogLevel::Debug, "keep")));
    }

    #[test]
    fn test_clear_filters_leaves_tags() {
        let core = SinkCore::new();
        core.add_only_tag("auth");
        core.add_rule(FilterRule::parse("level >= ERROR").unwrap());
        core.clear_filters();

        assert!(core.accepts(&tagged(&["auth"])));
        assert!(!core.accepts(&tagged(&["db"])));

        core.clear_tag_filters();
        assert!(core.accepts(&tagged(&["db"])));
    }
}
