//! Compiled output templates for text sinks.
//!
//! Token grammar:
//!
//! ```text
//! {token}           token with no spec
//! {token:spec}      token with format spec
//! {token,N}         right-aligned to width N
//! {token,-N}        left-aligned to width N
//! {token,N:spec}    alignment + spec
//! {{  }}            escaped literal braces
//! ```
//!
//! Recognized tokens: `timestamp`, `level`, `message`, `newline`,
//! `properties`, `template`, `source`, `threadId`, `exception`. Unknown
//! tokens render as the empty string. Timestamp specs use Serilog-style
//! pattern letters (`yyyy MM dd HH mm ss fff`), translated to chrono
//! format codes at parse time.

use chrono::Local;

use crate::entry::LogEntry;
use crate::level::LogLevel;

use super::format_timestamp_local;

const MAX_ALIGNMENT_WIDTH: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Timestamp,
    Level,
    Message,
    Newline,
    Properties,
    Template,
    Source,
    ThreadId,
    Exception,
}

fn resolve_token(name: &str) -> Option<Token> {
    match name {
        "timestamp" => Some(Token::Timestamp),
        "level" => Some(Token::Level),
        "message" => Some(Token::Message),
        "newline" => Some(Token::Newline),
        "properties" => Some(Token::Properties),
        "template" => Some(Token::Template),
        "source" => Some(Token::Source),
        "threadId" => Some(Token::ThreadId),
        "exception" => Some(Token::Exception),
        _ => None,
    }
}

#[derive(Debug, Clone)]
enum OutputSegment {
    Literal(String),
    Token {
        token: Token,
        spec: String,
        alignment: i32,
    },
}

/// A compiled output template: parse once, render many times. Immutable
/// after construction.
#[derive(Debug, Clone)]
pub struct OutputTemplate {
    segments: Vec<OutputSegment>,
    template: String,
}

impl OutputTemplate {
    pub fn new(template: &str) -> Self {
        OutputTemplate {
            segments: parse_segments(template),
            template: template.to_string(),
        }
    }

    pub fn template_string(&self) -> &str {
        &self.template
    }

    /// Render an entry. `message` is the display message (already
    /// locale-adjusted by the sink where applicable).
    pub fn render(&self, entry: &LogEntry, message: &str) -> String {
        let mut out = String::with_capacity(128);
        for segment in &self.segments {
            match segment {
                OutputSegment::Literal(text) => out.push_str(text),
                OutputSegment::Token { token, spec, alignment } => {
                    let value = match token {
                        Token::Timestamp => render_timestamp(entry, spec),
                        Token::Level => render_level(entry.level, spec),
                        Token::Message => message.to_string(),
                        Token::Newline => "\n".to_string(),
                        Token::Properties => render_properties(entry),
                        Token::Template => entry.template_str.clone(),
                        Token::Source => render_source(entry),
                        Token::ThreadId => entry.thread_id.clone(),
                        Token::Exception => render_exception(entry),
                    };
                    out.push_str(&align(&value, *alignment));
                }
            }
        }
        out
    }
}

fn parse_segments(template: &str) -> Vec<OutputSegment> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                if bytes.get(i + 1) == Some(&b'{') {
                    literal.push('{');
                    i += 2;
                    continue;
                }
                let close = match template[i + 1..].find('}') {
                    Some(off) => i + 1 + off,
                    None => {
                        literal.push('{');
                        i += 1;
                        continue;
                    }
                };
                let content = &template[i + 1..close];
                i = close + 1;

                if !literal.is_empty() {
                    segments.push(OutputSegment::Literal(std::mem::take(&mut literal)));
                }

                let (name, spec, alignment) = split_content(content);
                match resolve_token(name) {
                    Some(token) => {
                        let spec = if token == Token::Timestamp && !spec.is_empty() {
                            convert_timestamp_pattern(spec)
                        } else {
                            spec.to_string()
                        };
                        segments.push(OutputSegment::Token { token, spec, alignment });
                    }
                    // Unknown token renders as nothing.
                    None => segments.push(OutputSegment::Literal(String::new())),
                }
            }
            b'}' => {
                literal.push('}');
                i += if bytes.get(i + 1) == Some(&b'}') { 2 } else { 1 };
            }
            _ => {
                let run_start = i;
                while i < bytes.len() && bytes[i] != b'{' && bytes[i] != b'}' {
                    i += 1;
                }
                literal.push_str(&template[run_start..i]);
            }
        }
    }

    if !literal.is_empty() {
        segments.push(OutputSegment::Literal(literal));
    }
    segments
}

/// Split token content into `(name, spec, alignment)`. Alignment comes
/// before the spec: `{name,N:spec}`.
fn split_content(content: &str) -> (&str, &str, i32) {
    match content.find(',') {
        Some(comma) => {
            let name = &content[..comma];
            let rest = &content[comma + 1..];
            match rest.find(':') {
                Some(colon) => (name, &rest[colon + 1..], parse_alignment(&rest[..colon])),
                None => (name, "", parse_alignment(rest)),
            }
        }
        None => match content.find(':') {
            Some(colon) => (&content[..colon], &content[colon + 1..], 0),
            None => (content, "", 0),
        },
    }
}

fn parse_alignment(s: &str) -> i32 {
    let value: i32 = match s.trim().parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };
    value.clamp(-MAX_ALIGNMENT_WIDTH, MAX_ALIGNMENT_WIDTH)
}

/// Translate Serilog-style timestamp pattern letters into chrono format
/// codes. `%` is escaped so user text cannot inject format codes.
fn convert_timestamp_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;
    while i < pattern.len() {
        if pattern[i..].starts_with("yyyy") {
            out.push_str("%Y");
            i += 4;
        } else if pattern[i..].starts_with("MM") {
            out.push_str("%m");
            i += 2;
        } else if pattern[i..].starts_with("dd") {
            out.push_str("%d");
            i += 2;
        } else if pattern[i..].starts_with("HH") {
            out.push_str("%H");
            i += 2;
        } else if pattern[i..].starts_with("mm") {
            out.push_str("%M");
            i += 2;
        } else if pattern[i..].starts_with("ss") {
            out.push_str("%S");
            i += 2;
        } else if pattern[i..].starts_with("fff") {
            // Milliseconds, no leading dot.
            out.push_str("%3f");
            i += 3;
        } else {
            let c = pattern[i..].chars().next().unwrap();
            if c == '%' {
                out.push('%');
            }
            out.push(c);
            i += c.len_utf8();
        }
    }
    out
}

fn render_timestamp(entry: &LogEntry, spec: &str) -> String {
    if spec.is_empty() {
        return format_timestamp_local(&entry.timestamp);
    }
    entry.timestamp.with_timezone(&Local).format(spec).to_string()
}

fn render_level(level: LogLevel, spec: &str) -> String {
    match spec {
        "u3" => level.abbrev().to_string(),
        "l" => level.lower().to_string(),
        _ => level.as_str().to_string(),
    }
}

fn render_properties(entry: &LogEntry) -> String {
    let mut out = String::new();
    for (i, (key, value)) in entry.custom_context.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out
}

fn render_source(entry: &LogEntry) -> String {
    if entry.file.is_empty() {
        return String::new();
    }
    let mut out = format!("{}:{}", entry.file, entry.line);
    if !entry.function.is_empty() {
        out.push(' ');
        out.push_str(&entry.function);
    }
    out
}

fn render_exception(entry: &LogEntry) -> String {
    let ex = match &entry.exception {
        Some(ex) => ex,
        None => return String::new(),
    };
    let mut out = format!("{}: {}", ex.type_name, ex.message);
    for cause in ex.chain.split('\n').filter(|s| !s.is_empty()) {
        out.push_str("\n  --- ");
        out.push_str(cause);
    }
    out
}

fn align(value: &str, alignment: i32) -> String {
    if alignment == 0 {
        return value.to_string();
    }
    let width = alignment.unsigned_abs() as usize;
    let len = value.chars().count();
    if len >= width {
        return value.to_string();
    }
    let fill = " ".repeat(width - len);
    if alignment > 0 {
        format!("{}{}", fill, value)
    } else {
        format!("{}{}", value, fill)
    }
}
