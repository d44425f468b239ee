//! Compact filter syntax: whitespace-separated tokens, AND-combined,
//! desugared into DSL rules.
//!
//! ```text
//! LEVEL+        level >= LEVEL (case-insensitive; WARNING aliases WARN)
//! ~text         message contains
//! !~text        not message contains
//! tpl:text      template ==
//! !tpl:text     not template ==
//! ctx:key       context has key
//! ctx:key=val   context key == val
//! ```
//!
//! Values may be single- or double-quoted. Values containing a single
//! quote cannot be expressed (DSL limitation) and are rejected.

use crate::error::ConfigError;

use super::FilterRule;

/// Parse a compact filter expression into AND-combined rules.
pub fn parse_compact_filter(expr: &str) -> Result<Vec<FilterRule>, ConfigError> {
    let tokens = tokenize(expr)?;
    tokens.iter().map(|t| parse_token(t)).collect()
}

fn tokenize(expr: &str) -> Result<Vec<String>, ConfigError> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == ' ' || c == '\t' {
            chars.next();
            continue;
        }
        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c == ' ' || c == '\t' {
                break;
            }
            if c == '"' || c == '\'' {
                let quote = c;
                token.push(c);
                chars.next();
                let mut closed = false;
                for inner in chars.by_ref() {
                    token.push(inner);
                    if inner == quote {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(ConfigError::InvalidCompactFilter(
                        "unterminated quote in compact filter expression".to_string(),
                    ));
                }
            } else {
                token.push(c);
                chars.next();
            }
        }
        if !token.is_empty() {
            tokens.push(token);
        }
    }

    Ok(tokens)
}

fn parse_token(token: &str) -> Result<FilterRule, ConfigError> {
    let invalid = |msg: &str| ConfigError::InvalidCompactFilter(format!("{}: {}", msg, token));

    if token.is_empty() {
        return Err(ConfigError::InvalidCompactFilter("empty token".to_string()));
    }

    // LEVEL+
    if token.len() >= 2 && token.ends_with('+') {
        let mut level = token[..token.len() - 1].to_ascii_uppercase();
        if level == "WARNING" {
            level = "WARN".to_string();
        }
        if matches!(level.as_str(), "TRACE" | "DEBUG" | "INFO" | "WARN" | "ERROR" | "FATAL") {
            return FilterRule::parse(&format!("level >= {}", level));
        }
    }

    if let Some(rest) = token.strip_prefix("!tpl:") {
        if rest.is_empty() {
            return Err(invalid("missing value after '!tpl:'"));
        }
        return FilterRule::parse(&format!("not template == {}", dsl_quote(strip_quotes(rest))?));
    }

    if let Some(rest) = token.strip_prefix("tpl:") {
        if rest.is_empty() {
            return Err(invalid("missing value after 'tpl:'"));
        }
        return FilterRule::parse(&format!("template == {}", dsl_quote(strip_quotes(rest))?));
    }

    if let Some(rest) = token.strip_prefix("!~") {
        let keyword = strip_quotes(rest);
        if keyword.is_empty() {
            return Err(invalid("empty keyword"));
        }
        return FilterRule::parse(&format!("not message contains {}", dsl_quote(keyword)?));
    }

    if let Some(rest) = token.strip_prefix('~') {
        let keyword = strip_quotes(rest);
        if keyword.is_empty() {
            return Err(invalid("empty keyword"));
        }
        return FilterRule::parse(&format!("message contains {}", dsl_quote(keyword)?));
    }

    if let Some(rest) = token.strip_prefix("ctx:") {
        if rest.is_empty() {
            return Err(invalid("missing value after 'ctx:'"));
        }
        match find_unquoted_eq(rest) {
            Some(0) => Err(invalid("empty context key")),
            Some(eq) => {
                let key = strip_quotes(&rest[..eq]);
                let value = strip_quotes(&rest[eq + 1..]);
                if key.is_empty() {
                    return Err(invalid("empty context key"));
                }
                if value.is_empty() {
                    return Err(invalid("empty context value"));
                }
                FilterRule::parse(&format!("context {} == {}", key, dsl_quote(value)?))
            }
            None => {
                let key = strip_quotes(rest);
                FilterRule::parse(&format!("context has {}", dsl_quote(key)?))
            }
        }
    } else {
        Err(invalid("unrecognized compact filter token"))
    }
}

/// Strip a matching outer quote pair (single or double).
fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Locate the first `=` outside any quoted span.
fn find_unquoted_eq(s: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut quote = ' ';
    for (i, c) in s.char_indices() {
        if !in_quote && (c == '"' || c == '\'') {
            in_quote = true;
            quote = c;
        } else if in_quote && c == quote {
            in_quote = false;
        } else if !in_quote && c == '=' {
            return Some(i);
        }
    }
    None
}

/// Wrap a value in single quotes for DSL consumption. Values containing a
/// single quote cannot be represented and are rejected.
fn dsl_quote(s: &str) -> Result<String, ConfigError> {
    if s.contains('\'') {
        return Err(ConfigError::InvalidCompactFilter(format!(
            "value cannot contain single quotes (use a filter rule or predicate instead): {}",
            s
        )));
    }
    Ok(format!("'{}'", s))
}
