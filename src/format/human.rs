//! Human-readable line formatter.

use crate::entry::LogEntry;

use super::{format_timestamp_local, Formatter, OutputTemplate};

/// Default text formatter:
/// `<timestamp> [LEVEL] <message>[ [file:line function]][ {k=v, …}]`.
///
/// An output template, when set, replaces the default layout entirely.
#[derive(Debug, Default)]
pub struct HumanReadableFormatter {
    output_template: Option<OutputTemplate>,
}

impl HumanReadableFormatter {
    pub fn new() -> Self {
        HumanReadableFormatter { output_template: None }
    }

    pub fn with_output_template(template: &str) -> Self {
        HumanReadableFormatter {
            output_template: Some(OutputTemplate::new(template)),
        }
    }

    pub fn set_output_template(&mut self, template: &str) {
        self.output_template = Some(OutputTemplate::new(template));
    }

    pub fn clear_output_template(&mut self) {
        self.output_template = None;
    }

    pub fn output_template(&self) -> Option<&OutputTemplate> {
        self.output_template.as_ref()
    }
}

impl Formatter for HumanReadableFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        if let Some(tpl) = &self.output_template {
            return tpl.render(entry, &entry.message);
        }

        let mut out = String::with_capacity(
            48 + entry.message.len() + entry.file.len() + entry.function.len(),
        );
        out.push_str(&format_timestamp_local(&entry.timestamp));
        out.push_str(" [");
        out.push_str(entry.level.as_str());
        out.push_str("] ");
        out.push_str(&entry.message);

        if !entry.file.is_empty() {
            out.push_str(" [");
            out.push_str(&entry.file);
            out.push(':');
            out.push_str(&entry.line.to_string());
            out.push(' ');
            out.push_str(&entry.function);
            out.push(']');
        }

        if !entry.custom_context.is_empty() {
            out.push_str(" {");
            for (i, (key, value)) in entry.custom_context.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push('=');
                // Quote values containing delimiters.
                if value.contains(',') || value.contains('=') {
                    out.push('"');
                    out.push_str(value);
                    out.push('"');
                } else {
                    out.push_str(value);
                }
            }
            out.push('}');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;

    #[test]
    fn test_default_layout() {
        let e = LogEntry::new(LogLevel::Info, "Server started");
        let line = HumanReadableFormatter::new().format(&e);
        assert!(line.contains("[INFO] Server started"));
        // Timestamp prefix: "YYYY-MM-DD HH:MM:SS.mmm".
        assert_eq!(line.as_bytes()[4], b'-');
        assert_eq!(line.as_bytes()[10], b' ');
    }

    #[test]
    fn test_source_location_section() {
        let mut e = LogEntry::new(LogLevel::Debug, "msg");
        e.file = "main.rs".to_string();
        e.line = 7;
        e.function = "boot".to_string();
        let line = HumanReadableFormatter::new().format(&e);
        assert!(line.ends_with("msg [main.rs:7 boot]"));
    }

    #[test]
    fn test_context_section_with_quoting() {
        let mut e = LogEntry::new(LogLevel::Info, "msg");
        e.custom_context.insert("plain".to_string(), "value".to_string());
        e.custom_context.insert("tricky".to_string(), "a,b=c".to_string());
        let line = HumanReadableFormatter::new().format(&e);
        assert!(line.ends_with("msg {plain=value, tricky=\"a,b=c\"}"));
    }

    #[test]
    fn test_output_template_override() {
        let e = LogEntry::new(LogLevel::Warn, "careful");
        let fmt = HumanReadableFormatter::with_output_template("{level:u3} {message}");
        assert_eq!(fmt.format(&e), "WRN careful");
    }
}
