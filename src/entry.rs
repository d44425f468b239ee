//! The structured event record passed end-to-end through the pipeline.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::level::LogLevel;

/// Capture operator attached to a placeholder.
///
/// `Destructure` (`@`) hints structured formatters to preserve native
/// types; `Stringify` (`$`) forces string capture. Both are transparent in
/// rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyOp {
    None,
    Destructure,
    Stringify,
}

impl Default for PropertyOp {
    fn default() -> Self {
        PropertyOp::None
    }
}

/// One captured placeholder: name, raw (pre-format-spec) value, operator,
/// and the ordered pipe-transform names that were applied during rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderProperty {
    pub name: String,
    pub value: String,
    pub op: PropertyOp,
    pub transforms: Vec<String>,
}

/// Exception details attached to an entry.
///
/// `chain` is a newline-separated list of nested causes, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub message: String,
    pub chain: String,
}

impl ExceptionInfo {
    /// Build from a `std::error::Error`, walking `source()` outer→inner.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = String::new();
        let mut cause = err.source();
        while let Some(c) = cause {
            if !chain.is_empty() {
                chain.push('\n');
            }
            chain.push_str(&c.to_string());
            cause = c.source();
        }
        ExceptionInfo {
            type_name: type_name_of_error(err),
            message: err.to_string(),
            chain,
        }
    }
}

fn type_name_of_error(err: &(dyn std::error::Error + 'static)) -> String {
    let full = std::any::type_name_of_val(err);
    // Strip module path; the leaf type name is what readers expect.
    full.rsplit("::").next().unwrap_or(full).to_string()
}

/// The event record.
///
/// Built once on the producer thread and immutable after it has been
/// enqueued for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    /// Rendered message, format specs and pipe transforms applied, tag
    /// prefix stripped.
    pub message: String,
    /// Wall-clock capture at the log-call site (ms precision on output).
    pub timestamp: DateTime<Utc>,
    /// Raw template, double-brace escapes preserved. Empty for messages
    /// not produced from a template (e.g. validation warnings).
    pub template_str: String,
    /// FNV-1a 32-bit hash of `template_str`.
    pub template_hash: u32,
    /// Legacy name/value pairs, one per placeholder that received an
    /// argument. Redundant with `properties`; retained for custom
    /// formatters written against the older shape.
    pub arguments: Vec<(String, String)>,
    /// One property per placeholder, in template order.
    pub properties: Vec<PlaceholderProperty>,
    pub file: String,
    pub line: u32,
    pub function: String,
    /// Snapshot of logger context plus enricher output, insertion-ordered.
    pub custom_context: IndexMap<String, String>,
    /// Tags parsed from the leading `[tag]` run, unique, in parse order.
    pub tags: Vec<String>,
    /// Locale identifier active when the entry was rendered (e.g. "en_US").
    pub locale: String,
    /// Opaque identifier of the producer thread.
    pub thread_id: String,
    pub exception: Option<ExceptionInfo>,
}

impl LogEntry {
    /// A bare entry with the given level and message, no template.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        LogEntry {
            level,
            message: message.into(),
            timestamp: Utc::now(),
            template_str: String::new(),
            template_hash: 0,
            arguments: Vec::new(),
            properties: Vec::new(),
            file: String::new(),
            line: 0,
            function: String::new(),
            custom_context: IndexMap::new(),
            tags: Vec::new(),
            locale: String::new(),
            thread_id: String::new(),
            exception: None,
        }
    }

    /// Template hash rendered as 8 lowercase hex characters.
    pub fn hash_hex(&self) -> String {
        format!("{:08x}", self.template_hash)
    }

    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }
}

/// FNV-1a 32-bit hash, used for the template identifier.
pub fn fnv1a32(input: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for byte in input.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a32_known_vectors() {
        // Standard FNV-1a test vectors.
        assert_eq!(fnv1a32(""), 0x811c9dc5);
        assert_eq!(fnv1a32("a"), 0xe40c292c);
        assert_eq!(fnv1a32("foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_hash_depends_only_on_template() {
        let mut a = LogEntry::new(LogLevel::Info, "x");
        a.template_str = "User {name}".to_string();
        a.template_hash = fnv1a32(&a.template_str);
        let mut b = LogEntry::new(LogLevel::Error, "y");
        b.template_str = "User {name}".to_string();
        b.template_hash = fnv1a32(&b.template_str);
        assert_eq!(a.template_hash, b.template_hash);
        assert_eq!(a.hash_hex().len(), 8);
    }

    #[test]
    fn test_exception_chain_outer_to_inner() {
        use std::fmt;

        #[derive(Debug)]
        struct Leaf;
        impl fmt::Display for Leaf {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "disk full")
            }
        }
        impl std::error::Error for Leaf {}

        #[derive(Debug)]
        struct Mid(Leaf);
        impl fmt::Display for Mid {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "write failed")
            }
        }
        impl std::error::Error for Mid {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        #[derive(Debug)]
        struct Outer(Mid);
        impl fmt::Display for Outer {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "request failed")
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let info = ExceptionInfo::from_error(&Outer(Mid(Leaf)));
        assert_eq!(info.message, "request failed");
        assert_eq!(info.chain, "write failed\ndisk full");
        assert_eq!(info.type_name, "Outer");
    }
}
