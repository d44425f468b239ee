//! Filter pipeline: rule DSL, predicates, and the compact syntax sugar.
//!
//! Rules are AND-combined: an entry passes a rule list only if every rule
//! evaluates true. Evaluation order across the whole pipeline is defined
//! by the logger (global min level → global predicate → global rules →
//! per-sink tag routing → sink min level → sink predicate → sink rules).

pub mod compact;

pub use compact::parse_compact_filter;

use std::sync::Arc;

use crate::entry::LogEntry;
use crate::error::ConfigError;
use crate::level::LogLevel;

/// User-supplied predicate filter. Runs on the consumer thread; a
/// panicking predicate fails open (the entry passes that stage).
pub type FilterPredicate = Arc<dyn Fn(&LogEntry) -> bool + Send + Sync>;

pub(crate) fn eval_predicate(pred: &FilterPredicate, entry: &LogEntry) -> bool {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pred(entry))).unwrap_or(true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RuleKind {
    LevelGe(LogLevel),
    LevelEq(LogLevel),
    LevelNe(LogLevel),
    MessageContains(String),
    MessageStartsWith(String),
    ContextHas(String),
    ContextKeyEq(String, String),
    TemplateEq(String),
    TemplateContains(String),
}

/// A single parsed filter rule.
///
/// DSL syntax:
///
/// ```text
/// level >= LEVEL  /  level == LEVEL  /  level != LEVEL
/// message contains 'text'
/// message startswith 'text'
/// context has 'key'
/// context key == 'value'
/// template == 'exact template'
/// template contains 'partial'
/// not <rule>
/// ```
///
/// String values are delimited by outer single quotes with no escape
/// sequences; there is no way to express a value containing a single
/// quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    kind: RuleKind,
    negated: bool,
}

impl FilterRule {
    /// Parse a DSL rule string.
    pub fn parse(rule: &str) -> Result<FilterRule, ConfigError> {
        let invalid = || ConfigError::InvalidFilterRule(rule.to_string());

        let mut trimmed = rule.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidFilterRule("empty rule".to_string()));
        }

        let mut negated = false;
        if let Some(rest) = trimmed.strip_prefix("not ") {
            negated = true;
            trimmed = rest.trim();
            if trimmed.is_empty() {
                return Err(invalid());
            }
        }

        let kind = if let Some(rest) = trimmed.strip_prefix("level ") {
            let rest = rest.trim();
            if let Some(level) = rest.strip_prefix(">= ") {
                RuleKind::LevelGe(parse_level(level.trim()).ok_or_else(invalid)?)
            } else if let Some(level) = rest.strip_prefix("== ") {
                RuleKind::LevelEq(parse_level(level.trim()).ok_or_else(invalid)?)
            } else if let Some(level) = rest.strip_prefix("!= ") {
                RuleKind::LevelNe(parse_level(level.trim()).ok_or_else(invalid)?)
            } else {
                return Err(invalid());
            }
        } else if let Some(rest) = trimmed.strip_prefix("message ") {
            let rest = rest.trim();
            if let Some(value) = rest.strip_prefix("contains ") {
                RuleKind::MessageContains(unquote(value.trim()).ok_or_else(invalid)?)
            } else if let Some(value) = rest.strip_prefix("startswith ") {
                RuleKind::MessageStartsWith(unquote(value.trim()).ok_or_else(invalid)?)
            } else {
                return Err(invalid());
            }
        } else if let Some(rest) = trimmed.strip_prefix("context ") {
            let rest = rest.trim();
            if let Some(value) = rest.strip_prefix("has ") {
                RuleKind::ContextHas(unquote(value.trim()).ok_or_else(invalid)?)
            } else {
                let space = rest.find(' ').ok_or_else(invalid)?;
                let key = &rest[..space];
                let after = rest[space + 1..].trim();
                let value = after.strip_prefix("== ").ok_or_else(invalid)?;
                RuleKind::ContextKeyEq(
                    key.to_string(),
                    unquote(value.trim()).ok_or_else(invalid)?,
                )
            }
        } else if let Some(rest) = trimmed.strip_prefix("template ") {
            let rest = rest.trim();
            if let Some(value) = rest.strip_prefix("== ") {
                RuleKind::TemplateEq(unquote(value.trim()).ok_or_else(invalid)?)
            } else if let Some(value) = rest.strip_prefix("contains ") {
                RuleKind::TemplateContains(unquote(value.trim()).ok_or_else(invalid)?)
            } else {
                return Err(invalid());
            }
        } else {
            return Err(invalid());
        };

        Ok(FilterRule { kind, negated })
    }

    /// Evaluate against an entry. Returns true if the entry passes.
    pub fn evaluate(&self, entry: &LogEntry) -> bool {
        let result = match &self.kind {
            RuleKind::LevelGe(level) => entry.level >= *level,
            RuleKind::LevelEq(level) => entry.level == *level,
            RuleKind::LevelNe(level) => entry.level != *level,
            RuleKind::MessageContains(text) => entry.message.contains(text),
            RuleKind::MessageStartsWith(text) => entry.message.starts_with(text),
            RuleKind::ContextHas(key) => entry.custom_context.contains_key(key),
            RuleKind::ContextKeyEq(key, value) => {
                entry.custom_context.get(key).map(String::as_str) == Some(value.as_str())
            }
            RuleKind::TemplateEq(text) => entry.template_str == *text,
            RuleKind::TemplateContains(text) => entry.template_str.contains(text),
        };
        result != self.negated
    }
}

fn parse_level(s: &str) -> Option<LogLevel> {
    match s {
        "TRACE" => Some(LogLevel::Trace),
        "DEBUG" => Some(LogLevel::Debug),
        "INFO" => Some(LogLevel::Info),
        "WARN" => Some(LogLevel::Warn),
        "ERROR" => Some(LogLevel::Error),
        "FATAL" => Some(LogLevel::Fatal),
        _ => None,
    }
}

/// Strip the outermost single-quote pair.
fn unquote(s: &str) -> Option<String> {
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        Some(s[1..s.len() - 1].to_string())
    } else {
        None
    }
}
