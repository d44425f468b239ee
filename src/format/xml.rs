//! XML formatter.

use crate::entry::{LogEntry, PropertyOp};

use super::{format_timestamp_local, Formatter};

/// `<log_entry>` wrapper mirroring the verbose JSON fields. Property and
/// context names are sanitized to legal XML names; `@`/`$` operators
/// become `destructure="true"` / `stringify="true"` attributes.
#[derive(Debug, Default)]
pub struct XmlFormatter;

impl XmlFormatter {
    pub fn new() -> Self {
        XmlFormatter
    }
}

impl Formatter for XmlFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut xml = String::with_capacity(160 + entry.message.len());
        xml.push_str("<log_entry>");

        xml.push_str("<level>");
        xml.push_str(entry.level.as_str());
        xml.push_str("</level>");

        xml.push_str("<timestamp>");
        xml.push_str(&format_timestamp_local(&entry.timestamp));
        xml.push_str("</timestamp>");

        xml.push_str("<message>");
        xml.push_str(&escape_xml(&entry.message));
        xml.push_str("</message>");

        if !entry.template_str.is_empty() {
            xml.push_str("<MessageTemplate hash=\"");
            xml.push_str(&entry.hash_hex());
            xml.push_str("\">");
            xml.push_str(&escape_xml(&entry.template_str));
            xml.push_str("</MessageTemplate>");
        }

        if !entry.file.is_empty() {
            xml.push_str("<file>");
            xml.push_str(&escape_xml(&entry.file));
            xml.push_str("</file><line>");
            xml.push_str(&entry.line.to_string());
            xml.push_str("</line><function>");
            xml.push_str(&escape_xml(&entry.function));
            xml.push_str("</function>");
        }

        if !entry.custom_context.is_empty() {
            xml.push_str("<context>");
            for (key, value) in &entry.custom_context {
                let name = sanitize_xml_name(key);
                xml.push('<');
                xml.push_str(&name);
                xml.push('>');
                xml.push_str(&escape_xml(value));
                xml.push_str("</");
                xml.push_str(&name);
                xml.push('>');
            }
            xml.push_str("</context>");
        }

        if !entry.tags.is_empty() {
            xml.push_str("<tags>");
            for tag in &entry.tags {
                xml.push_str("<tag>");
                xml.push_str(&escape_xml(tag));
                xml.push_str("</tag>");
            }
            xml.push_str("</tags>");
        }

        if !entry.properties.is_empty() {
            xml.push_str("<properties>");
            for prop in &entry.properties {
                let name = sanitize_xml_name(&prop.name);
                xml.push('<');
                xml.push_str(&name);
                match prop.op {
                    PropertyOp::Destructure => xml.push_str(" destructure=\"true\""),
                    PropertyOp::Stringify => xml.push_str(" stringify=\"true\""),
                    PropertyOp::None => {}
                }
                xml.push('>');
                xml.push_str(&escape_xml(&prop.value));
                xml.push_str("</");
                xml.push_str(&name);
                xml.push('>');
            }
            xml.push_str("</properties>");
        }

        xml.push_str("</log_entry>");
        xml
    }
}

/// Replace characters that cannot start or continue an XML name with `_`.
fn sanitize_xml_name(input: &str) -> String {
    if input.is_empty() {
        return "_".to_string();
    }
    let mut out = String::with_capacity(input.len());
    for (i, c) in input.chars().enumerate() {
        let valid = c == '_'
            || c == ':'
            || c.is_ascii_alphabetic()
            || (i > 0 && (c.is_ascii_digit() || c == '-' || c == '.'));
        out.push(if valid { c } else { '_' });
    }
    out
}

fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let code = c as u32;
        if code < 0x20 && code != 0x09 && code != 0x0A && code != 0x0D {
            out.push(' ');
            continue;
        }
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
