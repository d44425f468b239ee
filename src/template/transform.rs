//! Pipe transforms: post-format value mutators invoked via `|name` inside
//! a placeholder, applied left-to-right. Unknown names are skipped.

use super::spec::group_digits;

/// Operator aliases carried by transforms: `expand` acts like `@` and
/// `str` like `$` for structured output. Both are transparent in text.
pub const ALIAS_EXPAND: &str = "expand";
pub const ALIAS_STR: &str = "str";

/// Apply one transform (argument included, e.g. `truncate:10`).
pub fn apply_transform(value: &str, transform: &str) -> String {
    let (name, arg) = match transform.find(':') {
        Some(i) => (&transform[..i], &transform[i + 1..]),
        None => (transform, ""),
    };

    match name {
        "upper" => value.to_uppercase(),
        "lower" => value.to_lowercase(),
        "trim" => value.trim().to_string(),
        "truncate" => truncate(value, arg),
        "pad" => pad(value, arg, false),
        "padl" => pad(value, arg, true),
        "quote" => format!("\"{}\"", value),
        "comma" => match parse_numeric(value) {
            Some(_) => group_digits(value, ",", "."),
            None => value.to_string(),
        },
        "hex" => match integer_of(value) {
            Some(v) if v < 0 => format!("-0x{:x}", v.unsigned_abs()),
            Some(v) => format!("0x{:x}", v),
            None => value.to_string(),
        },
        "oct" => match integer_of(value) {
            Some(v) if v < 0 => format!("-0{:o}", v.unsigned_abs()),
            Some(v) => format!("0{:o}", v),
            None => value.to_string(),
        },
        "bin" => match integer_of(value) {
            Some(v) if v < 0 => format!("-0b{:b}", v.unsigned_abs()),
            Some(v) => format!("0b{:b}", v),
            None => value.to_string(),
        },
        "bytes" => match parse_numeric(value) {
            Some(v) => human_bytes(v),
            None => value.to_string(),
        },
        "duration" => match integer_of(value) {
            Some(ms) if ms >= 0 => human_duration(ms as u64),
            _ => value.to_string(),
        },
        "pct" => match parse_numeric(value) {
            Some(v) => format!("{:.1}%", v * 100.0),
            None => value.to_string(),
        },
        "json" => json_value(value),
        "type" => detected_type(value).to_string(),
        // Operator aliases: transparent in rendered text.
        ALIAS_EXPAND | ALIAS_STR => value.to_string(),
        // Unknown transform: fail open.
        _ => value.to_string(),
    }
}

/// Apply a transform chain left-to-right.
pub fn apply_chain(value: &str, transforms: &[String]) -> String {
    let mut out = value.to_string();
    for t in transforms {
        out = apply_transform(&out, t);
    }
    out
}

fn parse_numeric(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn integer_of(value: &str) -> Option<i64> {
    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }
    parse_numeric(value).map(|v| v as i64)
}

/// Truncate to N codepoints with an ellipsis suffix.
fn truncate(value: &str, arg: &str) -> String {
    let limit: usize = match arg.parse() {
        Ok(n) => n,
        Err(_) => return value.to_string(),
    };
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let mut out: String = value.chars().take(limit).collect();
    out.push('…');
    out
}

fn pad(value: &str, arg: &str, left: bool) -> String {
    let width: usize = match arg.parse() {
        Ok(n) => n,
        Err(_) => return value.to_string(),
    };
    let len = value.chars().count();
    if len >= width {
        return value.to_string();
    }
    let fill = " ".repeat(width - len);
    if left {
        format!("{}{}", fill, value)
    } else {
        format!("{}{}", value, fill)
    }
}

fn human_bytes(v: f64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let negative = v < 0.0;
    let mut size = v.abs();
    if size < 1024.0 {
        let text = format!("{} {}", size as i64, UNITS[0]);
        return if negative { format!("-{}", text) } else { text };
    }
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let text = format!("{:.1} {}", size, UNITS[unit]);
    if negative {
        format!("-{}", text)
    } else {
        text
    }
}

fn human_duration(ms: u64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }
    let total_secs = ms / 1000;
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if mins > 0 {
        parts.push(format!("{}m", mins));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{}s", secs));
    }
    parts.join(" ")
}

/// JSON-native rendition of a stringified value: booleans and numbers stay
/// bare, everything else is quoted and escaped.
fn json_value(value: &str) -> String {
    crate::format::json_native_value(value).to_string()
}

fn detected_type(value: &str) -> &'static str {
    if value == "true" || value == "false" {
        return "bool";
    }
    if value.parse::<i64>().is_ok() {
        return "int";
    }
    if parse_numeric(value).is_some() {
        return "double";
    }
    "string"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_transforms() {
        assert_eq!(apply_transform("alice", "upper"), "ALICE");
        assert_eq!(apply_transform("HELLO", "lower"), "hello");
    }

    #[test]
    fn test_upper_is_idempotent() {
        let once = apply_transform("MiXeD", "upper");
        let twice = apply_transform(&once, "upper");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_quote_wraps_each_time() {
        let once = apply_transform("x", "quote");
        assert_eq!(once, "\"x\"");
        let twice = apply_transform(&once, "quote");
        assert_eq!(twice, "\"\"x\"\"");
    }

    #[test]
    fn test_trim_and_truncate() {
        assert_eq!(apply_transform("  hello  ", "trim"), "hello");
        assert_eq!(
            apply_transform("Hello, World! This is long", "truncate:10"),
            "Hello, Wor…"
        );
        assert_eq!(apply_transform("short", "truncate:10"), "short");
        // Codepoint counting, not bytes.
        assert_eq!(apply_transform("héllo", "truncate:3"), "hél…");
    }

    #[test]
    fn test_padding() {
        assert_eq!(apply_transform("Alice", "pad:10"), "Alice     ");
        assert_eq!(apply_transform("42", "padl:8"), "      42");
        assert_eq!(apply_transform("toolongvalue", "pad:4"), "toolongvalue");
    }

    #[test]
    fn test_number_transforms() {
        assert_eq!(apply_transform("1234567", "comma"), "1,234,567");
        assert_eq!(apply_transform("1234567.89", "comma"), "1,234,567.89");
        assert_eq!(apply_transform("255", "hex"), "0xff");
        assert_eq!(apply_transform("8", "oct"), "010");
        assert_eq!(apply_transform("10", "bin"), "0b1010");
        assert_eq!(apply_transform("not-a-number", "comma"), "not-a-number");
    }

    #[test]
    fn test_bytes() {
        assert_eq!(apply_transform("0", "bytes"), "0 B");
        assert_eq!(apply_transform("1024", "bytes"), "1.0 KB");
        assert_eq!(apply_transform("1048576", "bytes"), "1.0 MB");
        assert_eq!(apply_transform("1073741824", "bytes"), "1.0 GB");
        assert_eq!(apply_transform("hello", "bytes"), "hello");
    }

    #[test]
    fn test_duration() {
        assert_eq!(apply_transform("500", "duration"), "500ms");
        assert_eq!(apply_transform("61000", "duration"), "1m 1s");
        assert_eq!(apply_transform("3661000", "duration"), "1h 1m 1s");
    }

    #[test]
    fn test_pct() {
        assert_eq!(apply_transform("0.856", "pct"), "85.6%");
        assert_eq!(apply_transform("1.0", "pct"), "100.0%");
    }

    #[test]
    fn test_json_transform() {
        assert_eq!(apply_transform("hello world", "json"), "\"hello world\"");
        assert_eq!(apply_transform("42", "json"), "42");
        assert_eq!(apply_transform("true", "json"), "true");
    }

    #[test]
    fn test_type_transform() {
        assert_eq!(apply_transform("42", "type"), "int");
        assert_eq!(apply_transform("3.14", "type"), "double");
        assert_eq!(apply_transform("true", "type"), "bool");
        assert_eq!(apply_transform("hello", "type"), "string");
    }

    #[test]
    fn test_aliases_and_unknown_are_transparent() {
        assert_eq!(apply_transform("42", "expand"), "42");
        assert_eq!(apply_transform("42", "str"), "42");
        assert_eq!(apply_transform("hello", "nonexistent"), "hello");
    }

    #[test]
    fn test_chain_order() {
        let out = apply_chain(
            "  hello  ",
            &["trim".to_string(), "upper".to_string(), "quote".to_string()],
        );
        assert_eq!(out, "\"HELLO\"");
    }
}
