//! Format specifiers applied while rendering a placeholder's argument.
//!
//! All specifiers are fail-open: a non-numeric value (or an unknown spec)
//! passes through unchanged. Numeric detection uses Rust's float parser,
//! which is locale-independent by language definition.

use chrono::{Local, Locale, TimeZone, Utc};

/// Thousands-grouping and decimal-separator rules for a locale tag.
///
/// Covers the locale families the library commits to; anything else
/// renders without grouping, like the `C` locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NumberLocale {
    pub group: &'static str,
    pub decimal: &'static str,
}

pub(crate) fn number_locale(locale: &str) -> Option<NumberLocale> {
    if locale.is_empty() || locale == "C" || locale == "POSIX" {
        return None;
    }
    let lang = locale
        .split(|c| c == '_' || c == '-' || c == '.')
        .next()
        .unwrap_or(locale);
    match lang {
        "en" => Some(NumberLocale { group: ",", decimal: "." }),
        "de" | "es" | "it" | "pt" | "nl" => Some(NumberLocale { group: ".", decimal: "," }),
        "fr" | "ru" | "pl" | "cs" | "sv" | "fi" | "nb" => {
            Some(NumberLocale { group: " ", decimal: "," })
        }
        _ => None,
    }
}

fn chrono_locale(locale: &str) -> Locale {
    let normalized = locale.split('.').next().unwrap_or(locale).replace('-', "_");
    Locale::try_from(normalized.as_str()).unwrap_or(Locale::POSIX)
}

fn parse_numeric(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_width(digits: &str, fallback: usize) -> usize {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return fallback;
    }
    digits.parse::<usize>().unwrap_or(fallback).min(50)
}

/// Group the integer digits of a plain decimal string.
pub(crate) fn group_digits(value: &str, group: &str, decimal: &str) -> String {
    let (sign, rest) = match value.strip_prefix('-') {
        Some(r) => ("-", r),
        None => ("", value),
    };
    let (int_part, frac_part) = match rest.find('.') {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    let digits = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (digits - i) % 3 == 0 {
            grouped.push_str(group);
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    out.push_str(sign);
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push_str(decimal);
        out.push_str(frac);
    }
    out
}

/// C-style scientific notation: 6-digit mantissa, sign and two-digit
/// exponent (e.g. `9.876543e+06`).
fn scientific(val: f64, uppercase: bool) -> String {
    let formatted = format!("{:.6e}", val);
    let (mantissa, exp) = match formatted.split_once('e') {
        Some(parts) => parts,
        None => (formatted.as_str(), "0"),
    };
    let exp_val: i32 = exp.parse().unwrap_or(0);
    let e = if uppercase { 'E' } else { 'e' };
    format!("{}{}{}{:03}", mantissa, e, if exp_val < 0 { "-" } else { "+" }, exp_val.abs())
}

fn saturating_i64(val: f64) -> i64 {
    // `as` saturates and maps NaN to 0.
    val as i64
}

/// Apply a format specifier to a stringified argument.
pub fn apply_format(value: &str, spec: &str, locale: &str) -> String {
    if spec.is_empty() {
        return value.to_string();
    }
    let bytes = spec.as_bytes();

    // Fixed-point: .Nf
    if bytes.len() >= 2 && bytes[0] == b'.' && bytes[bytes.len() - 1] == b'f' {
        let num = match parse_numeric(value) {
            Some(v) => v,
            None => return value.to_string(),
        };
        let precision = parse_width(&spec[1..spec.len() - 1], 6);
        return format!("{:.*}", precision, num);
    }

    // Fixed-point shorthand: Nf
    if bytes.len() >= 2 && bytes[bytes.len() - 1] == b'f' && bytes[0].is_ascii_digit() {
        let num = match parse_numeric(value) {
            Some(v) => v,
            None => return value.to_string(),
        };
        let precision = parse_width(&spec[..spec.len() - 1], 6);
        return format!("{:.*}", precision, num);
    }

    match spec {
        // Currency: sign-preserving $ prefix, two decimals.
        "C" | "c" => match parse_numeric(value) {
            Some(v) if v < 0.0 => format!("-${:.2}", -v),
            Some(v) => format!("${:.2}", v),
            None => value.to_string(),
        },
        // Integer hex, sign preserved.
        "X" | "x" => match parse_numeric(value) {
            Some(v) => {
                let int = saturating_i64(v);
                let mag = int.unsigned_abs();
                let digits = if spec == "X" {
                    format!("{:X}", mag)
                } else {
                    format!("{:x}", mag)
                };
                if int < 0 {
                    format!("-{}", digits)
                } else {
                    digits
                }
            }
            None => value.to_string(),
        },
        "E" | "e" => match parse_numeric(value) {
            Some(v) => scientific(v, spec == "E"),
            None => value.to_string(),
        },
        // Percentage: value x 100, two decimals.
        "P" | "p" => match parse_numeric(value) {
            Some(v) => format!("{:.2}%", v * 100.0),
            None => value.to_string(),
        },
        // Locale-aware number.
        "n" | "N" => match parse_numeric(value) {
            Some(v) => {
                let plain = if v == v.trunc() && v.abs() < 1e15 {
                    format!("{}", v as i64)
                } else {
                    format!("{}", v)
                };
                match number_locale(locale) {
                    Some(nl) => group_digits(&plain, nl.group, nl.decimal),
                    None => plain,
                }
            }
            None => value.to_string(),
        },
        "d" | "D" | "t" | "T" | "f" | "F" => format_epoch(value, spec, locale),
        _ => {
            // Zero-padded integer: 0N, sign preserved, width excludes sign.
            if bytes.len() >= 2 && bytes[0] == b'0' && bytes[1].is_ascii_digit() {
                let num = match parse_numeric(value) {
                    Some(v) => v,
                    None => return value.to_string(),
                };
                let width = parse_width(&spec[1..], 1);
                let int = saturating_i64(num);
                if int < 0 {
                    format!("-{:0width$}", int.unsigned_abs(), width = width)
                } else {
                    format!("{:0width$}", int, width = width)
                }
            } else {
                // Unknown spec: fail open.
                value.to_string()
            }
        }
    }
}

/// Interpret the value as seconds-since-epoch and render a date/time form
/// in the active locale. Non-numeric values pass through.
fn format_epoch(value: &str, spec: &str, locale: &str) -> String {
    let secs = match parse_numeric(value) {
        Some(v) => saturating_i64(v),
        None => return value.to_string(),
    };
    let utc = match Utc.timestamp_opt(secs, 0).single() {
        Some(ts) => ts,
        None => return value.to_string(),
    };
    let local = utc.with_timezone(&Local);
    let loc = chrono_locale(locale);

    let pattern = match spec {
        "d" => "%x",
        "D" => "%A, %B %-d, %Y",
        "t" => "%H:%M",
        "T" => "%H:%M:%S",
        "f" => "%A, %B %-d, %Y %H:%M",
        _ => "%A, %B %-d, %Y %H:%M:%S",
    };
    local.format_localized(pattern, loc).to_string()
}
