//! Context engine: template rendering, condition evaluation, and
//! output-mapping utilities used to pass data between workflow steps.
//!
//! The execution context is a flat `key -> JSON value` map. Templates use
//! `{{key}}` placeholders (inner whitespace tolerated); unknown keys render
//! as the empty string, which is policy, not an error -- a missing value
//! must never abort a run.

use std::collections::HashMap;

use serde_json::{json, Value};

/// The key-value store passed between steps.
pub type Context = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Template rendering
// ---------------------------------------------------------------------------

/// Substitute every `{{key}}` occurrence with the stringified context value.
///
/// Unknown keys render as the empty string. Text without placeholders is
/// returned unchanged.
pub fn render_template(text: &str, context: &Context) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let Some(end_rel) = rest[start + 2..].find("}}") else {
            break; // unterminated placeholder, emit the tail verbatim
        };
        let end = start + 2 + end_rel;
        result.push_str(&rest[..start]);

        let key = rest[start + 2..end].trim();
        if let Some(value) = context.get(key) {
            result.push_str(&value_to_string(value));
        }
        rest = &rest[end + 2..];
    }

    result.push_str(rest);
    result
}

/// Convert a JSON value to its template string form.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // Objects/arrays render as compact JSON
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Condition evaluation
// ---------------------------------------------------------------------------

/// Evaluate a condition template against the context.
///
/// When the entire trimmed template is exactly one `{{key}}` placeholder,
/// the raw context value's truthiness decides, so boolean context values
/// behave naturally. Otherwise the template is rendered and string
/// truthiness applies: `""`, `"false"` and `"0"` are false.
pub fn evaluate_condition(template: &str, context: &Context) -> bool {
    if let Some(key) = single_placeholder(template) {
        return match context.get(key) {
            Some(value) => value_truthiness(value),
            None => false,
        };
    }
    string_truthiness(&render_template(template, context))
}

/// If `template` is exactly one `{{key}}` placeholder, return the key.
fn single_placeholder(template: &str) -> Option<&str> {
    let trimmed = template.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn value_truthiness(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => string_truthiness(s),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_truthiness(s: &str) -> bool {
    !matches!(s.trim(), "" | "false" | "0")
}

// ---------------------------------------------------------------------------
// Output mapping
// ---------------------------------------------------------------------------

/// Resolve a top-level field name against a step's result object.
///
/// Paths are dot-free field names (e.g. `"output"`); anything else, or a
/// non-object result, yields `None`.
pub fn extract_value(result: &Value, path: &str) -> Option<Value> {
    result.get(path).cloned()
}

/// Shallow-merge `updates` into `base`; updates win on key collision.
pub fn merge_context(base: &mut Context, updates: Context) {
    for (key, value) in updates {
        base.insert(key, value);
    }
}

/// Cap a value at `max_bytes` of serialized size before it enters the
/// context, replacing oversized values with a truncation marker.
pub fn bounded_value(value: Value, max_bytes: usize) -> Value {
    let size = serde_json::to_string(&value).map(|s| s.len()).unwrap_or(0);
    if size <= max_bytes {
        return value;
    }
    tracing::warn!(size, max = max_bytes, "mapped output exceeds size limit, truncating");
    json!({
        "_truncated": true,
        "_original_size": size,
        "_message": format!("output exceeded {max_bytes} byte limit and was truncated"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
