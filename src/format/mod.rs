//! Formatters render a `LogEntry` into a string for a sink's transport.
//! No trailing newline; transports append it.

pub mod clef;
pub mod human;
pub mod json;
pub mod output_template;
pub mod xml;

pub use clef::CompactJsonFormatter;
pub use human::HumanReadableFormatter;
pub use json::JsonFormatter;
pub use output_template::OutputTemplate;
pub use xml::XmlFormatter;

use chrono::{DateTime, Local, Utc};
use serde_json::Value;

use crate::entry::LogEntry;

/// Pure function from an entry to a rendered line.
pub trait Formatter: Send + Sync {
    fn format(&self, entry: &LogEntry) -> String;
}

/// Local-time timestamp with millisecond precision, used by the human
/// and verbose structured formatters.
pub(crate) fn format_timestamp_local(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

/// ISO-8601 UTC timestamp with millisecond precision, used by CLEF.
pub(crate) fn format_timestamp_utc(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// JSON-native rendition of a destructured (`@`) property value.
///
/// Values arrive as strings (post-stringification), so the original type
/// is gone. `"true"`/`"false"` become booleans and numeric-looking strings
/// become numbers; everything else stays a string. A string argument
/// `"3.14"` therefore becomes the number `3.14`: use the `$` operator to
/// force string capture where that coercion is undesirable.
///
/// Re-serialization follows the structured-output contract: integral
/// magnitudes below 1e15 emit as integers, other finite numbers as float
/// text. Rust's float parsing and formatting are locale-independent, so no
/// separator rewriting is needed.
pub(crate) fn json_native_value(value: &str) -> Value {
    if value == "true" {
        return Value::Bool(true);
    }
    if value == "false" {
        return Value::Bool(false);
    }
    if value.is_empty() {
        return Value::String(String::new());
    }

    if let Ok(num) = value.parse::<f64>() {
        if num.is_finite() {
            if num == num.trunc() && num.abs() < 1e15 {
                return Value::Number(serde_json::Number::from(num as i64));
            }
            if let Some(n) = serde_json::Number::from_f64(num) {
                return Value::Number(n);
            }
        }
    }

    Value::String(value.to_string())
}

/// Render the message a sink should display: the entry's own message, or a
/// re-render when the sink overrides the locale.
pub(crate) fn display_message(entry: &LogEntry, locale_override: Option<&str>) -> String {
    match locale_override {
        Some(loc) if loc != entry.locale => crate::template::render_for_locale(entry, loc),
        _ => entry.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_native_value_coercion() {
        assert_eq!(json_native_value("true"), Value::Bool(true));
        assert_eq!(json_native_value("false"), Value::Bool(false));
        assert_eq!(json_native_value("42").to_string(), "42");
        assert_eq!(json_native_value("3.14159").to_string(), "3.14159");
        assert_eq!(json_native_value("-7").to_string(), "-7");
        assert_eq!(json_native_value("hello").to_string(), "\"hello\"");
        assert_eq!(json_native_value("").to_string(), "\"\"");
        // Non-finite never becomes a JSON number.
        assert_eq!(json_native_value("inf").to_string(), "\"inf\"");
        assert_eq!(json_native_value("NaN").to_string(), "\"NaN\"");
    }

    #[test]
    fn test_large_integral_magnitudes_stay_float_text() {
        let v = json_native_value("1e16");
        assert!(matches!(v, Value::Number(_)));
        assert!(v.to_string().contains('e') || v.to_string().contains("10000000000000000"));
    }

    #[test]
    fn test_string_escaping_round_trips() {
        // RFC 8259 escaping: escape composed with unescape reconstitutes
        // the original for BMP strings.
        for original in ["a\"b", "back\\slash", "line\nbreak", "\u{1}", "héllo", "\t\r"] {
            let escaped = Value::String(original.to_string()).to_string();
            let back: Value = serde_json::from_str(&escaped).unwrap();
            assert_eq!(back.as_str().unwrap(), original);
        }
    }
}
