//! Template engine: parsing, caching, and rendering of named-placeholder
//! message templates with format specifiers and pipe transforms.

pub mod cache;
pub mod parser;
pub mod spec;
pub mod transform;

pub use cache::{TemplateCache, DEFAULT_CACHE_CAPACITY};
pub use parser::{parse, split_tags, Placeholder, Segment, TemplatePlan};
pub use spec::apply_format;
pub use transform::{apply_chain, apply_transform};

use crate::entry::{LogEntry, PlaceholderProperty, PropertyOp};

/// Render a compiled plan against positional argument values.
///
/// The format spec is applied first, then each pipe transform in order. A
/// placeholder whose index exceeds the argument count renders as the
/// original `{…}` substring of the template.
pub fn render_message(plan: &TemplatePlan, values: &[String], locale: &str) -> String {
    let mut out = String::with_capacity(plan.template.len());
    let mut index = 0;
    for segment in &plan.segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(ph) => {
                if let Some(value) = values.get(index) {
                    let formatted = apply_format(value, &ph.spec, locale);
                    out.push_str(&apply_chain(&formatted, &ph.transforms));
                } else {
                    out.push_str(&plan.template[ph.start..=ph.end]);
                }
                index += 1;
            }
        }
    }
    out
}

/// The operator carried into structured output: an explicit `@`/`$` wins,
/// otherwise the first `expand`/`str` pipe alias applies.
fn effective_op(ph: &Placeholder) -> PropertyOp {
    if ph.op != PropertyOp::None {
        return ph.op;
    }
    for t in &ph.transforms {
        match t.as_str() {
            transform::ALIAS_EXPAND => return PropertyOp::Destructure,
            transform::ALIAS_STR => return PropertyOp::Stringify,
            _ => {}
        }
    }
    PropertyOp::None
}

/// Extract one property per placeholder that received a value, carrying
/// the raw pre-spec value, operator, and transform list.
pub fn extract_properties(plan: &TemplatePlan, values: &[String]) -> Vec<PlaceholderProperty> {
    plan.placeholders()
        .zip(values.iter())
        .map(|(ph, value)| PlaceholderProperty {
            name: ph.name.clone(),
            value: value.clone(),
            op: effective_op(ph),
            transforms: ph.transforms.clone(),
        })
        .collect()
}

/// Legacy name/value pairs, aligned with `extract_properties`.
pub fn map_arguments(plan: &TemplatePlan, values: &[String]) -> Vec<(String, String)> {
    plan.placeholders()
        .zip(values.iter())
        .map(|(ph, value)| (ph.name.clone(), value.clone()))
        .collect()
}

/// Placeholder/value arity validation. Each problem yields a fixed-form
/// warning message, emitted as a secondary WARN entry by the logger.
pub fn validate_placeholders(plan: &TemplatePlan, values: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut seen: Vec<&str> = Vec::new();

    for ph in plan.placeholders() {
        if ph.name.is_empty() {
            warnings.push("Warning: Empty placeholder found".to_string());
        } else if seen.contains(&ph.name.as_str()) {
            warnings.push(format!("Warning: Repeated placeholder name: {}", ph.name));
        } else {
            seen.push(&ph.name);
        }
    }

    let placeholder_count = plan.placeholder_count();
    if placeholder_count > values.len() {
        warnings.push("Warning: More placeholders than provided values".to_string());
    } else if placeholder_count < values.len() {
        warnings.push("Warning: More values provided than placeholders".to_string());
    }

    warnings
}

/// Re-render an entry's message under a different locale, for sinks with a
/// locale override. Uncached parse; overrides are per-sink configuration,
/// not the hot path.
pub(crate) fn render_for_locale(entry: &LogEntry, locale: &str) -> String {
    if entry.template_str.is_empty() {
        return entry.message.clone();
    }
    let (_, body) = split_tags(&entry.template_str);
    let plan = parse(body);
    let values: Vec<String> = entry.arguments.iter().map(|(_, v)| v.clone()).collect();
    render_message(&plan, &values, locale)
}
