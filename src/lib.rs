//! Structured, multi-sink application logging for latency-sensitive
//! server and tooling processes.
//!
//! Log calls take named-placeholder message templates; entries are
//! rendered on the calling thread, routed through a filter pipeline, and
//! delivered by a background consumer to one or more concurrent sinks
//! (console, files with rotation, HTTP, syslog) with selectable
//! formatters (human-readable, verbose JSON, CLEF-style compact JSON,
//! XML).
//!
//! ```no_run
//! use lunar_log::{Logger, LogLevel};
//!
//! let logger = Logger::new(LogLevel::Info);
//! logger.info("User {username} logged in from {ip}", &[&"alice", &"192.168.1.1"]);
//! logger.warn("[auth] Failed login for {user}", &[&"admin"]);
//! logger.flush();
//! ```
//!
//! Placeholders support format specifiers (`{amount:.2f}`, `{id:04}`,
//! `{ts:D}`) and pipe transforms (`{name|upper}`, `{size|bytes}`,
//! `{msg|truncate:40}`); the `@`/`$` operators control how values are
//! captured in structured output.

pub mod config;
pub mod entry;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod format;
pub mod level;
pub mod logger;
pub mod sink;
pub mod template;
pub mod transport;

pub use config::{FormatKind, LoggerBuilder, LoggerConfig, SinkConfig};
pub use entry::{fnv1a32, ExceptionInfo, LogEntry, PlaceholderProperty, PropertyOp};
pub use enrich::Enricher;
pub use error::{BatchError, ConfigError};
pub use filter::{FilterPredicate, FilterRule};
pub use format::Formatter;
pub use level::LogLevel;
pub use logger::{ContextScope, LogArg, Logger, SinkHandle};
pub use sink::Sink;
pub use transport::Transport;
