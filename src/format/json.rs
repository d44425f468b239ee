//! Verbose JSON formatter.

use serde_json::{Map, Value};

use crate::entry::{LogEntry, PropertyOp};

use super::{format_timestamp_local, json_native_value, Formatter};

/// Structured JSON with a fixed key order: `level`, `timestamp`,
/// `message`, `messageTemplate`, `templateHash`, then the optional
/// sections (`file`/`line`/`function`, `context`, `tags`, `properties`,
/// `transforms`).
///
/// Properties captured with the `@` operator are emitted as native JSON
/// numbers/booleans when their string form parses as such; `$` and plain
/// properties are always strings.
#[derive(Debug, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        JsonFormatter
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut obj = Map::new();

        obj.insert("level".to_string(), Value::String(entry.level.as_str().to_string()));
        obj.insert(
            "timestamp".to_string(),
            Value::String(format_timestamp_local(&entry.timestamp)),
        );
        obj.insert("message".to_string(), Value::String(entry.message.clone()));

        if !entry.template_str.is_empty() {
            obj.insert(
                "messageTemplate".to_string(),
                Value::String(entry.template_str.clone()),
            );
            obj.insert("templateHash".to_string(), Value::String(entry.hash_hex()));
        }

        if !entry.file.is_empty() {
            obj.insert("file".to_string(), Value::String(entry.file.clone()));
            obj.insert("line".to_string(), Value::Number(entry.line.into()));
            obj.insert("function".to_string(), Value::String(entry.function.clone()));
        }

        if !entry.custom_context.is_empty() {
            let mut ctx = Map::new();
            for (key, value) in &entry.custom_context {
                ctx.insert(key.clone(), Value::String(value.clone()));
            }
            obj.insert("context".to_string(), Value::Object(ctx));
        }

        if !entry.tags.is_empty() {
            obj.insert(
                "tags".to_string(),
                Value::Array(entry.tags.iter().map(|t| Value::String(t.clone())).collect()),
            );
        }

        if !entry.properties.is_empty() {
            let mut props = Map::new();
            for prop in &entry.properties {
                let value = if prop.op == PropertyOp::Destructure {
                    json_native_value(&prop.value)
                } else {
                    Value::String(prop.value.clone())
                };
                props.insert(prop.name.clone(), value);
            }
            obj.insert("properties".to_string(), Value::Object(props));

            if entry.properties.iter().any(|p| !p.transforms.is_empty()) {
                let mut transforms = Map::new();
                for prop in &entry.properties {
                    if prop.transforms.is_empty() {
                        continue;
                    }
                    transforms.insert(
                        prop.name.clone(),
                        Value::Array(
                            prop.transforms.iter().map(|t| Value::String(t.clone())).collect(),
                        ),
                    );
                }
                obj.insert("transforms".to_string(), Value::Object(transforms));
            }
        }

        Value::Object(obj).to_string()
    }
}
