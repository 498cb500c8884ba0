//! JSON-schema cleanup for Gemini `functionDeclarations`.
//!
//! The Gemini schema dialect is an OpenAPI subset. Keywords it rejects are removed;
//! scalar constraints survive as description hints so the model still sees them.

use serde_json::{json, Map, Value};

pub const PLACEHOLDER_PARAM: &str = "_placeholder";
const PLACEHOLDER_DESCRIPTION: &str = "Placeholder. Always pass true.";

const HINTED_CONSTRAINTS: &[&str] = &[
    "minLength",
    "maxLength",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "pattern",
    "minItems",
    "maxItems",
    "format",
    "default",
    "examples",
];

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "$defs",
    "definitions",
    "$ref",
    "$id",
    "$comment",
    "additionalProperties",
    "propertyNames",
    "title",
    "const",
];

const MAX_DEPTH: usize = 16;

/// Object schema with a single boolean property, for tools without parameters.
pub fn placeholder_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            PLACEHOLDER_PARAM: {"type": "boolean", "description": PLACEHOLDER_DESCRIPTION}
        },
        "required": [PLACEHOLDER_PARAM]
    })
}

/// Parameters schema for a function declaration. Always an object schema with at
/// least one property.
pub fn gemini_parameters(schema: Option<&Value>) -> Value {
    let Some(schema) = schema else {
        return placeholder_schema();
    };
    let Value::Object(mut map) = clean_schema(schema, 0) else {
        return placeholder_schema();
    };
    map.insert("type".to_string(), json!("object"));
    let has_properties = map
        .get("properties")
        .and_then(|p| p.as_object())
        .is_some_and(|p| !p.is_empty());
    if !has_properties {
        return placeholder_schema();
    }
    Value::Object(map)
}

fn hint_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn append_description(map: &mut Map<String, Value>, hint: &str) {
    let merged = match map.get("description").and_then(|d| d.as_str()) {
        Some(existing) if !existing.is_empty() => format!("{} ({})", existing, hint),
        _ => hint.to_string(),
    };
    map.insert("description".to_string(), Value::String(merged));
}

/// Clean one schema node and everything below it.
pub fn clean_schema(schema: &Value, depth: usize) -> Value {
    let Value::Object(source) = schema else {
        return schema.clone();
    };
    if depth >= MAX_DEPTH {
        return json!({"type": "string"});
    }

    // `anyOf`/`oneOf` without a type: keep the first concrete branch.
    if !source.contains_key("type") {
        for key in ["anyOf", "oneOf"] {
            if let Some(Value::Array(branches)) = source.get(key) {
                let chosen = branches.iter().find(|b| {
                    b.get("type").and_then(|t| t.as_str()) != Some("null")
                });
                if let Some(branch) = chosen {
                    let mut merged = source.clone();
                    merged.remove("anyOf");
                    merged.remove("oneOf");
                    if let Value::Object(b) = branch {
                        for (k, v) in b {
                            merged.entry(k.clone()).or_insert_with(|| v.clone());
                        }
                    }
                    return clean_schema(&Value::Object(merged), depth + 1);
                }
            }
        }
    }

    let mut map = Map::new();
    for (key, value) in source {
        if key == "anyOf" || key == "oneOf" || key == "allOf" {
            continue;
        }
        map.insert(key.clone(), value.clone());
    }

    if let Some(c) = map.get("const").cloned() {
        if !map.contains_key("enum") {
            map.insert("enum".to_string(), Value::Array(vec![c]));
        }
    }

    if let Some(Value::Array(types)) = map.get("type").cloned() {
        let nullable = types.iter().any(|t| t == "null");
        let first = types
            .iter()
            .find(|t| *t != "null")
            .cloned()
            .unwrap_or_else(|| json!("string"));
        map.insert("type".to_string(), first);
        if nullable {
            map.insert("nullable".to_string(), json!(true));
        }
    }

    for constraint in HINTED_CONSTRAINTS {
        if let Some(value) = map.remove(*constraint) {
            if !(value.is_object() || value.is_array()) {
                append_description(&mut map, &format!("{}: {}", constraint, hint_text(&value)));
            }
        }
    }
    for keyword in UNSUPPORTED_KEYWORDS {
        map.remove(*keyword);
    }

    if let Some(Value::Object(props)) = map.get("properties").cloned() {
        let cleaned: Map<String, Value> = props
            .iter()
            .map(|(k, v)| (k.clone(), clean_schema(v, depth + 1)))
            .collect();
        if let Some(Value::Array(required)) = map.get("required").cloned() {
            let kept: Vec<Value> = required
                .into_iter()
                .filter(|r| r.as_str().is_some_and(|name| cleaned.contains_key(name)))
                .collect();
            if kept.is_empty() {
                map.remove("required");
            } else {
                map.insert("required".to_string(), Value::Array(kept));
            }
        }
        map.insert("properties".to_string(), Value::Object(cleaned));
    } else {
        map.remove("required");
    }

    if let Some(items) = map.get("items").cloned() {
        let cleaned = match items {
            Value::Array(tuple) => tuple
                .first()
                .map(|first| clean_schema(first, depth + 1))
                .unwrap_or_else(|| json!({"type": "string"})),
            other => clean_schema(&other, depth + 1),
        };
        map.insert("items".to_string(), cleaned);
    }

    if map.get("type").and_then(|t| t.as_str()) == Some("object") && depth > 0 {
        let empty = map
            .get("properties")
            .and_then(|p| p.as_object())
            .map_or(true, |p| p.is_empty());
        if empty {
            if let Value::Object(placeholder) = placeholder_schema() {
                map.extend(placeholder);
            }
        }
    }

    Value::Object(map)
}
