//! Tool schema cache and tool-name sanitization.
//!
//! Upstream function names may not start with a digit. Such names get
//! [`SANITIZED_PREFIX`] prepended on the way out and are mapped back on the way in.
//! Names that already look sanitized (`t_3d`) are prefixed as well, so a caller's
//! `t_3d` and `3d` never share an upstream name.
//! The declared parameter types of every tool seen in a request are remembered so
//! response arguments can be re-typed (see [`crate::adapter::normalize`]).

use crate::types::ToolDefinition;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

pub const SANITIZED_PREFIX: &str = "t_";

/// Nesting bound for descriptor extraction.
const MAX_SCHEMA_DEPTH: usize = 8;

pub const UNKNOWN_TYPE: &str = "unknown";

/// Upstream-safe name for `name`. Pure and injective; does not record the mapping.
pub fn sanitized_tool_name(name: &str) -> String {
    let mut rest = name;
    while let Some(stripped) = rest.strip_prefix(SANITIZED_PREFIX) {
        rest = stripped;
    }
    if rest.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("{}{}", SANITIZED_PREFIX, name)
    } else {
        name.to_string()
    }
}

/// Shallow type descriptor of a declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub type_tag: String,
    /// Element descriptor for arrays.
    pub items: Option<Box<SchemaDescriptor>>,
    /// Property descriptors for objects.
    pub properties: BTreeMap<String, SchemaDescriptor>,
}

impl SchemaDescriptor {
    pub fn of_type(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            items: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::of_type(UNKNOWN_TYPE)
    }

    pub fn from_schema(schema: &Value) -> Self {
        Self::extract(schema, 0)
    }

    fn extract(schema: &Value, depth: usize) -> Self {
        let Some(obj) = schema.as_object() else {
            return Self::unknown();
        };
        let type_tag = match obj.get("type") {
            Some(Value::String(t)) => t.clone(),
            // `["string", "null"]` style unions: first non-null member.
            Some(Value::Array(ts)) => ts
                .iter()
                .filter_map(|t| t.as_str())
                .find(|t| *t != "null")
                .unwrap_or(UNKNOWN_TYPE)
                .to_string(),
            _ if obj.contains_key("properties") => "object".to_string(),
            _ if obj.contains_key("items") => "array".to_string(),
            _ => UNKNOWN_TYPE.to_string(),
        };

        let mut desc = Self::of_type(type_tag);
        if depth >= MAX_SCHEMA_DEPTH {
            return desc;
        }
        match desc.type_tag.as_str() {
            "array" => {
                if let Some(items) = obj.get("items") {
                    desc.items = Some(Box::new(Self::extract(items, depth + 1)));
                }
            }
            "object" => {
                if let Some(props) = obj.get("properties").and_then(|p| p.as_object()) {
                    desc.properties = props
                        .iter()
                        .map(|(k, v)| (k.clone(), Self::extract(v, depth + 1)))
                        .collect();
                }
            }
            _ => {}
        }
        desc
    }

    pub fn is(&self, type_tag: &str) -> bool {
        self.type_tag == type_tag
    }
}

/// Parameter descriptors of one tool, keyed by parameter name.
pub type ToolParams = BTreeMap<String, SchemaDescriptor>;

fn params_of(tool: &ToolDefinition) -> ToolParams {
    tool.parameters
        .as_ref()
        .and_then(|s| s.get("properties"))
        .and_then(|p| p.as_object())
        .map(|props| {
            props
                .iter()
                .map(|(k, v)| (k.clone(), SchemaDescriptor::from_schema(v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Process- or session-scoped tool cache. Unbounded: entries live as long as the
/// cache and the last writer wins per tool name.
#[derive(Default)]
pub struct ToolSchemaCache {
    schemas: RwLock<HashMap<String, ToolParams>>,
    /// sanitized → original
    names: RwLock<HashMap<String, String>>,
}

impl ToolSchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize `name` and remember the reverse mapping when it changed.
    pub fn sanitize_name(&self, name: &str) -> String {
        let sanitized = sanitized_tool_name(name);
        if sanitized != name {
            let mut names = self.names.write().unwrap_or_else(|p| p.into_inner());
            names.insert(sanitized.clone(), name.to_string());
        }
        sanitized
    }

    pub fn resolve_original_name(&self, name: &str) -> String {
        let names = self.names.read().unwrap_or_else(|p| p.into_inner());
        names.get(name).cloned().unwrap_or_else(|| name.to_string())
    }

    /// Register every tool's parameter descriptors under its original name and, when
    /// different, its sanitized name. A sanitized key wins over an equal original
    /// name, since lookups use the name as sent upstream.
    pub fn cache_schemas(&self, tools: &[ToolDefinition]) {
        if tools.is_empty() {
            return;
        }
        let entries: Vec<(String, String, ToolParams)> = tools
            .iter()
            .map(|t| (t.name.clone(), self.sanitize_name(&t.name), params_of(t)))
            .collect();
        let mut schemas = self.schemas.write().unwrap_or_else(|p| p.into_inner());
        for (original, _, params) in &entries {
            schemas.insert(original.clone(), params.clone());
        }
        for (original, sanitized, params) in entries {
            if sanitized != original {
                schemas.insert(sanitized, params);
            }
        }
    }

    /// Declared descriptor of `param` on `tool`. `None` means "no declared type".
    pub fn param_type(&self, tool: &str, param: &str) -> Option<SchemaDescriptor> {
        let schemas = self.schemas.read().unwrap_or_else(|p| p.into_inner());
        schemas.get(tool).and_then(|ps| ps.get(param)).cloned()
    }

    pub fn tool_params(&self, tool: &str) -> Option<ToolParams> {
        let schemas = self.schemas.read().unwrap_or_else(|p| p.into_inner());
        schemas.get(tool).cloned()
    }
}
