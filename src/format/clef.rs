//! Compact JSON formatter (CLEF-style).
//!
//! Single-line JSON optimized for log pipelines (ELK, Datadog, Loki),
//! with `@`-prefixed system fields:
//!
//! - `@t`  timestamp (ISO 8601, UTC, ms precision)
//! - `@l`  level (3-char abbreviation; omitted for INFO)
//! - `@mt` message template (falls back to the rendered message)
//! - `@i`  template hash (8 hex chars, when a template is present)
//! - `@m`  rendered message (opt-in, off by default)
//! - `@x`  exception (`type: message`, nested chain appended)
//!
//! Properties and context are flattened to the top level. User property
//! names starting with `@` are escaped to `@@`. Parsers assume INFO when
//! `@l` is absent.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};

use crate::entry::{LogEntry, PropertyOp};
use crate::level::LogLevel;

use super::{format_timestamp_utc, json_native_value, Formatter};

#[derive(Debug, Default)]
pub struct CompactJsonFormatter {
    include_rendered_message: AtomicBool,
}

impl CompactJsonFormatter {
    pub fn new() -> Self {
        CompactJsonFormatter {
            include_rendered_message: AtomicBool::new(false),
        }
    }

    /// Enable or disable the `@m` (rendered message) field.
    pub fn include_rendered_message(&self, include: bool) {
        self.include_rendered_message.store(include, Ordering::Relaxed);
    }

    pub fn is_rendered_message_included(&self) -> bool {
        self.include_rendered_message.load(Ordering::Relaxed)
    }
}

fn escape_property_name(name: &str) -> String {
    if name.starts_with('@') {
        format!("@{}", name)
    } else {
        name.to_string()
    }
}

impl Formatter for CompactJsonFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut obj = Map::new();

        obj.insert(
            "@t".to_string(),
            Value::String(format_timestamp_utc(&entry.timestamp)),
        );

        if entry.level != LogLevel::Info {
            obj.insert("@l".to_string(), Value::String(entry.level.abbrev().to_string()));
        }

        let mt = if entry.template_str.is_empty() {
            &entry.message
        } else {
            &entry.template_str
        };
        obj.insert("@mt".to_string(), Value::String(mt.clone()));

        if !entry.template_str.is_empty() {
            obj.insert("@i".to_string(), Value::String(entry.hash_hex()));
        }

        if self.include_rendered_message.load(Ordering::Relaxed) {
            obj.insert("@m".to_string(), Value::String(entry.message.clone()));
        }

        if let Some(ex) = &entry.exception {
            let mut x = format!("{}: {}", ex.type_name, ex.message);
            if !ex.chain.is_empty() {
                x.push('\n');
                x.push_str(&ex.chain);
            }
            obj.insert("@x".to_string(), Value::String(x));
        }

        for prop in &entry.properties {
            let value = if prop.op == PropertyOp::Destructure {
                json_native_value(&prop.value)
            } else {
                Value::String(prop.value.clone())
            };
            obj.insert(escape_property_name(&prop.name), value);
        }

        // Context keys are flattened alongside properties.
        for (key, value) in &entry.custom_context {
            obj.insert(escape_property_name(key), Value::String(value.clone()));
        }

        if !entry.tags.is_empty() {
            obj.insert(
                "tags".to_string(),
                Value::Array(entry.tags.iter().map(|t| Value::String(t.clone())).collect()),
            );
        }

        Value::Object(obj).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{fnv1a32, ExceptionInfo, PlaceholderProperty};

    fn entry(level: LogLevel, template: &str, message: &str) -> LogEntry {
        let mut e = LogEntry::new(level, message);
        e.template_str = template.to_string();
        e.template_hash = fnv1a32(template);
        e
    }

    #[test]
    fn test_level_omitted_for_info() {
        let out = CompactJsonFormatter::new().format(&entry(LogLevel::Info, "t", "m"));
        assert!(!out.contains("\"@l\""));

        let out = CompactJsonFormatter::new().format(&entry(LogLevel::Warn, "t", "m"));
        assert!(out.contains("\"@l\":\"WRN\""));
    }

    #[test]
    fn test_template_and_hash() {
        let e = entry(LogLevel::Info, "User {name}", "User alice");
        let out = CompactJsonFormatter::new().format(&e);
        assert!(out.contains("\"@mt\":\"User {name}\""));
        let expected = format!("\"@i\":\"{:08x}\"", fnv1a32("User {name}"));
        assert!(out.contains(&expected));
        assert!(!out.contains("\"@m\""));
    }

    #[test]
    fn test_message_fallback_without_template() {
        let e = LogEntry::new(LogLevel::Info, "bare message");
        let out = CompactJsonFormatter::new().format(&e);
        assert!(out.contains("\"@mt\":\"bare message\""));
        assert!(!out.contains("\"@i\""));
    }

    #[test]
    fn test_rendered_message_opt_in() {
        let fmt = CompactJsonFormatter::new();
        fmt.include_rendered_message(true);
        let out = fmt.format(&entry(LogLevel::Info, "User {name}", "User alice"));
        assert!(out.contains("\"@m\":\"User alice\""));
    }

    #[test]
    fn test_timestamp_is_utc_iso() {
        let out = CompactJsonFormatter::new().format(&entry(LogLevel::Info, "t", "m"));
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        let t = parsed["@t"].as_str().unwrap();
        assert!(t.ends_with('Z'));
        assert_eq!(t.as_bytes()[10], b'T');
        // Millisecond precision: ".mmmZ" suffix.
        assert_eq!(t.len(), 24);
    }

    #[test]
    fn test_properties_flattened_and_coerced() {
        let mut e = entry(LogLevel::Info, "a={@a} b={b}", "a=1 b=2");
        e.properties = vec![
            PlaceholderProperty {
                name: "a".to_string(),
                value: "1".to_string(),
                op: PropertyOp::Destructure,
                transforms: vec![],
            },
            PlaceholderProperty {
                name: "b".to_string(),
                value: "2".to_string(),
                op: PropertyOp::None,
                transforms: vec![],
            },
        ];
        let out = CompactJsonFormatter::new().format(&e);
        assert!(out.contains("\"a\":1"));
        assert!(out.contains("\"b\":\"2\""));
    }

    #[test]
    fn test_at_prefixed_user_names_escaped() {
        let mut e = entry(LogLevel::Info, "{@t}", "x");
        e.properties = vec![PlaceholderProperty {
            name: "@t".to_string(),
            value: "boom".to_string(),
            op: PropertyOp::None,
            transforms: vec![],
        }];
        let out = CompactJsonFormatter::new().format(&e);
        assert!(out.contains("\"@@t\":\"boom\""));
    }

    #[test]
    fn test_context_flattened_and_tags() {
        let mut e = entry(LogLevel::Info, "t", "m");
        e.custom_context.insert("env".to_string(), "prod".to_string());
        e.tags = vec!["auth".to_string(), "security".to_string()];
        let out = CompactJsonFormatter::new().format(&e);
        assert!(out.contains("\"env\":\"prod\""));
        assert!(out.contains("\"tags\":[\"auth\",\"security\"]"));
    }

    #[test]
    fn test_exception_field() {
        let mut e = entry(LogLevel::Error, "t", "m");
        e.exception = Some(ExceptionInfo {
            type_name: "IoError".to_string(),
            message: "write failed".to_string(),
            chain: "disk full".to_string(),
        });
        let out = CompactJsonFormatter::new().format(&e);
        assert!(out.contains("\"@x\":\"IoError: write failed\\ndisk full\""));
    }

    #[test]
    fn test_single_line() {
        let mut e = entry(LogLevel::Error, "t", "m");
        e.exception = Some(ExceptionInfo {
            type_name: "E".to_string(),
            message: "m".to_string(),
            chain: "a\nb".to_string(),
        });
        let out = CompactJsonFormatter::new().format(&e);
        assert!(!out.contains('\n'));
    }
}
