//! Message template parsing.
//!
//! A template is a literal string with `{placeholder}` slots. `{{` and `}}`
//! are escapes for literal braces. Placeholder content follows
//! `[op] name [':' spec] ['|' transform ('|' transform)*]` where `op` is
//! `@` (destructure) or `$` (stringify).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::entry::PropertyOp;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// A parsed placeholder descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    /// Raw format spec (text after the last `:`), empty if absent.
    pub spec: String,
    /// Pipe transforms in application order, argument text included
    /// (e.g. `truncate:10`).
    pub transforms: Vec<String>,
    pub op: PropertyOp,
    /// Byte offset of the opening `{` in the template.
    pub start: usize,
    /// Byte offset of the closing `}` in the template.
    pub end: usize,
}

/// One compiled template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text with `{{`/`}}` escapes already collapsed.
    Literal(String),
    Placeholder(Placeholder),
}

/// Parsed form of a template: an ordered segment list.
///
/// Produced once per distinct template (see the template cache) and shared
/// between the renderer and the property-extraction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePlan {
    pub template: String,
    pub segments: Vec<Segment>,
}

impl TemplatePlan {
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders().count()
    }
}

/// Split a leading run of `[tag]` prefixes off a template.
///
/// Tags must be adjacent (no whitespace between brackets) and match
/// `[A-Za-z0-9_-]+`. A bracket whose contents do not match terminates
/// parsing; the remainder (from that bracket on) is the message body,
/// unchanged. Duplicate tags are dropped. Whitespace after the tag run is
/// not part of the body.
pub fn split_tags(template: &str) -> (Vec<String>, &str) {
    let mut tags: Vec<String> = Vec::new();
    let mut rest = template;

    while let Some(stripped) = rest.strip_prefix('[') {
        let close = match stripped.find(']') {
            Some(i) => i,
            None => break,
        };
        let candidate = &stripped[..close];
        if !TAG_RE.is_match(candidate) {
            break;
        }
        if !tags.iter().any(|t| t == candidate) {
            tags.push(candidate.to_string());
        }
        rest = &stripped[close + 1..];
    }

    if tags.is_empty() {
        (tags, template)
    } else {
        (tags, rest.trim_start_matches(' '))
    }
}

/// Parse a template into its segment plan.
pub fn parse(template: &str) -> TemplatePlan {
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
                        // Unterminated placeholder: the remainder is
                        // literal, escapes still collapse.
                        push_remainder_literal(&mut literal, &template[i..]);
                        i = bytes.len();
                        continue;
                    }
                };
                let content = &template[i + 1..close];
                match parse_content(content) {
                    Some((name, spec, transforms, op)) => {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        segments.push(Segment::Placeholder(Placeholder {
                            name,
                            spec,
                            transforms,
                            op,
                            start: i,
                            end: close,
                        }));
                    }
                    // Invalid operator form: the whole {…} is literal text.
                    None => literal.push_str(&template[i..=close]),
                }
                i = close + 1;
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
        segments.push(Segment::Literal(literal));
    }

    TemplatePlan {
        template: template.to_string(),
        segments,
    }
}

fn push_remainder_literal(literal: &mut String, remainder: &str) {
    let bytes = remainder.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
            literal.push('{');
            i += 2;
        } else if bytes[i] == b'}' && bytes.get(i + 1) == Some(&b'}') {
            literal.push('}');
            i += 2;
        } else {
            let run_start = i;
            i += 1;
            while i < bytes.len()
                && !(bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{'))
                && !(bytes[i] == b'}' && bytes.get(i + 1) == Some(&b'}'))
            {
                i += 1;
            }
            literal.push_str(&remainder[run_start..i]);
        }
    }
}

/// Parse placeholder content. Returns `None` for invalid operator forms
/// (e.g. `@`, `@@x`, `@ x`), which render verbatim as literal text.
fn parse_content(content: &str) -> Option<(String, String, Vec<String>, PropertyOp)> {
    let (head, pipes) = match content.find('|') {
        Some(i) => (&content[..i], &content[i + 1..]),
        None => (content, ""),
    };

    let (mut name, spec) = match head.rfind(':') {
        Some(i) => (&head[..i], &head[i + 1..]),
        None => (head, ""),
    };

    let mut op = PropertyOp::None;
    if let Some(first) = name.chars().next() {
        if first == '@' || first == '$' {
            let rest = &name[1..];
            let valid_start = rest
                .chars()
                .next()
                .map(|c| c.is_ascii_alphanumeric() || c == '_')
                .unwrap_or(false);
            if !valid_start {
                return None;
            }
            op = if first == '@' {
                PropertyOp::Destructure
            } else {
                PropertyOp::Stringify
            };
            name = rest;
        }
    }

    let transforms: Vec<String> = if pipes.is_empty() {
        Vec::new()
    } else {
        pipes.split('|').map(str::to_string).collect()
    };

    Some((name.to_string(), spec.to_string(), transforms, op))
}
