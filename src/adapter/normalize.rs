//! Tool-call argument and tool-result normalization.
//!
//! Upstream models sometimes return structured arguments as JSON-encoded strings,
//! or plain strings with doubly escaped newlines. The declared parameter type decides
//! what is undone. None of these functions fail; on any doubt the value is returned
//! as it came in.

use super::repair::try_repair;
use crate::cache::{SchemaDescriptor, ToolSchemaCache};
use crate::transform::schema::PLACEHOLDER_PARAM;
use serde_json::{Map, Value};

/// Recursion bound for tool-result walking.
pub const MAX_NORMALIZE_DEPTH: usize = 16;

/// Unescape `s` as a JSON string literal when it carries literal `\n`/`\t` sequences
/// and no literal `\"` or `\\`. Anything else is returned unchanged.
pub fn clean_escapes(s: &str) -> String {
    let has_whitespace_escapes = s.contains("\\n") || s.contains("\\t");
    let has_structural_escapes = s.contains("\\\"") || s.contains("\\\\");
    if !has_whitespace_escapes || has_structural_escapes {
        return s.to_string();
    }
    serde_json::from_str::<String>(&format!("\"{}\"", s)).unwrap_or_else(|_| s.to_string())
}

fn matches_container(value: &Value, type_tag: &str) -> bool {
    match type_tag {
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => false,
    }
}

/// Normalize one argument value against its declared descriptor.
pub fn normalize_arg(value: Value, declared: Option<&SchemaDescriptor>) -> Value {
    match (value, declared) {
        (Value::String(s), Some(desc)) if desc.is("array") || desc.is("object") => {
            // Only a parse of the declared kind replaces the string; `"[1]"` for an
            // object parameter stays text.
            match serde_json::from_str::<Value>(&s) {
                Ok(parsed) if matches_container(&parsed, &desc.type_tag) => {
                    normalize_nested(parsed, desc)
                }
                _ => Value::String(clean_escapes(&s)),
            }
        }
        (Value::String(s), _) => Value::String(clean_escapes(&s)),
        (value @ (Value::Array(_) | Value::Object(_)), Some(desc)) => {
            normalize_nested(value, desc)
        }
        (value, _) => value,
    }
}

fn normalize_nested(value: Value, desc: &SchemaDescriptor) -> Value {
    match value {
        Value::Array(items) => {
            let item_desc = desc.items.as_deref();
            Value::Array(items.into_iter().map(|v| normalize_arg(v, item_desc)).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let d = desc.properties.get(&k);
                    (k, normalize_arg(v, d))
                })
                .collect(),
        ),
        other => other,
    }
}

/// Normalize every named argument of a call to `tool` (the name as sent upstream).
pub fn normalize_tool_args(tool: &str, args: Value, cache: &ToolSchemaCache) -> Value {
    let params = cache.tool_params(tool);
    match args {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (name, value) in map {
                let declared = params.as_ref().and_then(|p| p.get(&name));
                if name == PLACEHOLDER_PARAM && declared.is_none() {
                    continue;
                }
                out.insert(name, normalize_arg(value, declared));
            }
            Value::Object(out)
        }
        // Whole-argument strings: some models encode the arguments object itself.
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed @ Value::Object(_)) => normalize_tool_args(tool, parsed, cache),
            _ => Value::String(clean_escapes(&s)),
        },
        other => other,
    }
}

fn looks_complete(t: &str) -> bool {
    (t.starts_with('{') && t.ends_with('}')) || (t.starts_with('[') && t.ends_with(']'))
}

fn looks_truncated(t: &str) -> bool {
    (t.starts_with('{') || t.starts_with('[')) && !looks_complete(t)
}

/// Walk a tool-result payload, decoding JSON-looking string leaves.
pub fn normalize_function_response(value: Value) -> Value {
    normalize_response_at(value, 0)
}

fn normalize_response_at(value: Value, depth: usize) -> Value {
    if depth >= MAX_NORMALIZE_DEPTH {
        return value;
    }
    match value {
        Value::String(s) => {
            let t = s.trim();
            if looks_complete(t) {
                if let Ok(parsed) = serde_json::from_str::<Value>(t) {
                    return normalize_response_at(parsed, depth + 1);
                }
            } else if looks_truncated(t) {
                if let Some((_, parsed)) = try_repair(t) {
                    return normalize_response_at(parsed, depth + 1);
                }
            }
            Value::String(clean_escapes(&s))
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| normalize_response_at(v, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_response_at(v, depth + 1)))
                .collect(),
        ),
        other => other,
    }
}
