//! Anthropic Messages body for Claude-family models.

use super::context::TransformContext;
use super::gemini::system_text;
use super::thinking::{resolve_thinking, ThinkingMode, AUTO_BUDGET};
use super::WireFormat;
use crate::cache::sanitized_tool_name;
use crate::config::{FeatureFlags, ThinkingRepresentation};
use crate::types::{ChatRequest, ContentPart, MessageRole, ToolChoice};
use serde_json::{json, Map, Value};

pub const DEFAULT_MAX_TOKENS: u32 = 8192;
/// `max_tokens` used when the requested one leaves no room after the thinking budget.
pub const THINKING_MAX_TOKENS: u32 = 64_000;
pub const DEFAULT_THINKING_BUDGET: i64 = 32_768;
pub const MIN_THINKING_BUDGET: i64 = 1024;
/// Largest budget that still leaves `MIN_THINKING_BUDGET` tokens of answer under
/// `THINKING_MAX_TOKENS`; `max_tokens` must exceed `budget_tokens`.
pub const MAX_THINKING_BUDGET: i64 = THINKING_MAX_TOKENS as i64 - MIN_THINKING_BUDGET;

pub struct ClaudeMessagesFormat;

fn tool_use_id(id: &Option<String>, name: &str) -> String {
    id.clone()
        .unwrap_or_else(|| format!("toolu_{}", sanitized_tool_name(name)))
}

fn convert_block(part: &ContentPart) -> Option<Value> {
    match part {
        ContentPart::Text { text } => {
            if text.is_empty() {
                None
            } else {
                Some(json!({ "type": "text", "text": text }))
            }
        }
        ContentPart::Thinking { text, signature } => signature.as_ref().map(|sig| {
            json!({ "type": "thinking", "thinking": text, "signature": sig })
        }),
        ContentPart::Image { media_type, data } => Some(json!({
            "type": "image",
            "source": { "type": "base64", "media_type": media_type, "data": data }
        })),
        ContentPart::ToolCall { id, name, arguments } => {
            let input = if arguments.is_object() {
                arguments.clone()
            } else {
                json!({ "value": arguments })
            };
            Some(json!({
                "type": "tool_use",
                "id": tool_use_id(id, name),
                "name": sanitized_tool_name(name),
                "input": input
            }))
        }
        ContentPart::ToolResult {
            tool_call_id,
            name,
            content,
            is_error,
        } => {
            let text = match content {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let mut block = json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id(tool_call_id, name),
                "content": text
            });
            if *is_error {
                block["is_error"] = json!(true);
            }
            Some(block)
        }
    }
}

fn tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({ "type": "auto" }),
        ToolChoice::None => json!({ "type": "none" }),
        ToolChoice::Required => json!({ "type": "any" }),
        ToolChoice::Tool { name } => json!({ "type": "tool", "name": sanitized_tool_name(name) }),
    }
}

impl WireFormat for ClaudeMessagesFormat {
    fn name(&self) -> &'static str {
        "claude-messages"
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        _ctx: &TransformContext,
        _features: &FeatureFlags,
    ) -> Value {
        let mut messages: Vec<(&'static str, Vec<Value>)> = Vec::new();
        for msg in request.messages.iter().filter(|m| m.role != MessageRole::System) {
            let blocks: Vec<Value> = msg.content.iter().filter_map(convert_block).collect();
            if blocks.is_empty() {
                continue;
            }
            let role = if msg.role == MessageRole::Assistant {
                "assistant"
            } else {
                "user"
            };
            match messages.last_mut() {
                Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
                _ => messages.push((role, blocks)),
            }
        }

        let gen = &request.generation;
        let mut body = Map::new();
        body.insert(
            "messages".into(),
            Value::Array(
                messages
                    .into_iter()
                    .map(|(role, content)| json!({ "role": role, "content": content }))
                    .collect(),
            ),
        );
        if let Some(system) = system_text(request) {
            body.insert("system".into(), json!(system));
        }

        let mut max_tokens = gen.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        // Claude only takes a numeric budget, whatever the Gemini flag says.
        let thinking = resolve_thinking(gen.thinking.as_ref(), ThinkingRepresentation::Budget);
        if let Some(thinking) = thinking {
            match thinking.mode {
                ThinkingMode::Budget(0) => {
                    body.insert("thinking".into(), json!({ "type": "disabled" }));
                }
                ThinkingMode::Budget(budget) => {
                    let budget = if budget == AUTO_BUDGET {
                        DEFAULT_THINKING_BUDGET
                    } else {
                        budget.clamp(MIN_THINKING_BUDGET, MAX_THINKING_BUDGET)
                    };
                    if i64::from(max_tokens) <= budget {
                        max_tokens = THINKING_MAX_TOKENS;
                    }
                    body.insert(
                        "thinking".into(),
                        json!({ "type": "enabled", "budget_tokens": budget }),
                    );
                }
                ThinkingMode::Level(_) => {}
            }
        }
        body.insert("max_tokens".into(), json!(max_tokens));

        if let Some(t) = gen.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = gen.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if let Some(k) = gen.top_k {
            body.insert("top_k".into(), json!(k));
        }
        if !gen.stop_sequences.is_empty() {
            body.insert("stop_sequences".into(), json!(gen.stop_sequences));
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    let mut schema = tool
                        .parameters
                        .clone()
                        .filter(|p| p.is_object())
                        .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));
                    if let Some(obj) = schema.as_object_mut() {
                        obj.remove("$schema");
                    }
                    let mut decl = json!({
                        "name": sanitized_tool_name(&tool.name),
                        "input_schema": schema
                    });
                    if let Some(desc) = &tool.description {
                        decl["description"] = json!(desc);
                    }
                    decl
                })
                .collect();
            body.insert("tools".into(), Value::Array(tools));
        }
        if let Some(choice) = &request.tool_choice {
            body.insert("tool_choice".into(), tool_choice(choice));
        }

        Value::Object(body)
    }
}
