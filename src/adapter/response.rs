//! Stateful payload → canonical response adapter.
//!
//! One [`ResponseAdapter`] lives for one call. It understands the Gemini
//! `candidates[].content.parts` shape and the Anthropic Messages shapes (batched
//! `content` blocks and streamed `content_block_*` events), and performs the
//! response-side corrections as it goes:
//!
//! - tool names are restored through the sanitized-name map
//! - tool-call arguments are re-typed against the cached parameter schema
//! - tool-result payloads are decoded / repaired
//! - reasoning text followed by a signature is recorded in the signature cache

use super::errors::{parse_upstream_error, rewrite_error};
use super::normalize::{normalize_function_response, normalize_tool_args};
use super::repair::try_repair;
use crate::cache::SharedCaches;
use crate::pipeline::SseEvent;
use crate::types::{CanonicalResponse, ModelFamily, ResponsePart, StreamSummary, UsageMetadata};
use crate::{Error, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Apply the unwrap rule: first plain object of an array, then a nested `response`.
pub fn unwrap_payload(value: Value) -> Value {
    let value = match value {
        Value::Array(items) => items
            .into_iter()
            .find(|v| v.is_object())
            .unwrap_or(Value::Null),
        other => other,
    };
    match value {
        Value::Object(mut map) if map.get("response").is_some_and(|r| r.is_object()) => {
            map.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn u64_field(v: &Value, key: &str) -> Option<u64> {
    v.get(key).and_then(|x| x.as_u64())
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(|s| s.to_string())
}

fn non_empty_str<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(|x| x.as_str()).filter(|s| !s.is_empty())
}

fn merge_usage(into: &mut Option<UsageMetadata>, update: UsageMetadata) {
    let cur = into.get_or_insert_with(UsageMetadata::default);
    cur.prompt_tokens = update.prompt_tokens.or(cur.prompt_tokens);
    cur.completion_tokens = update.completion_tokens.or(cur.completion_tokens);
    cur.thoughts_tokens = update.thoughts_tokens.or(cur.thoughts_tokens);
    cur.cached_tokens = update.cached_tokens.or(cur.cached_tokens);
    cur.total_tokens = update.total_tokens.or(cur.total_tokens);
}

fn gemini_usage(v: &Value) -> Option<UsageMetadata> {
    let u = v.get("usageMetadata")?;
    Some(UsageMetadata {
        prompt_tokens: u64_field(u, "promptTokenCount"),
        completion_tokens: u64_field(u, "candidatesTokenCount"),
        thoughts_tokens: u64_field(u, "thoughtsTokenCount"),
        cached_tokens: u64_field(u, "cachedContentTokenCount"),
        total_tokens: u64_field(u, "totalTokenCount"),
    })
}

fn anthropic_usage(u: &Value) -> UsageMetadata {
    let prompt = u64_field(u, "input_tokens");
    let completion = u64_field(u, "output_tokens");
    UsageMetadata {
        prompt_tokens: prompt,
        completion_tokens: completion,
        thoughts_tokens: None,
        cached_tokens: u64_field(u, "cache_read_input_tokens"),
        total_tokens: match (prompt, completion) {
            (Some(p), Some(c)) => Some(p + c),
            _ => None,
        },
    }
}

/// Tool-use block being streamed as `input_json_delta` fragments.
#[derive(Debug, Default)]
struct PendingToolUse {
    id: Option<String>,
    name: String,
    json: String,
}

pub struct ResponseAdapter {
    family: ModelFamily,
    session_id: String,
    caches: SharedCaches,
    /// Reasoning text seen since the last recorded signature.
    thought_buffer: String,
    usage: Option<UsageMetadata>,
    finish_reason: Option<String>,
    chunks: usize,
    pending_tools: BTreeMap<u64, PendingToolUse>,
    model: Option<String>,
    endpoint: String,
}

impl ResponseAdapter {
    pub fn new(family: ModelFamily, session_id: impl Into<String>, caches: SharedCaches) -> Self {
        Self {
            family,
            session_id: session_id.into(),
            caches,
            thought_buffer: String::new(),
            usage: None,
            finish_reason: None,
            chunks: 0,
            pending_tools: BTreeMap::new(),
            model: None,
            endpoint: String::new(),
        }
    }

    /// Model id used in rewritten error messages.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Endpoint reported by in-band upstream errors.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Adapt one SSE frame. `Ok(None)` means "skip": keepalives, metadata-only
    /// frames, `[DONE]` and frames that are not JSON.
    pub fn adapt_event(&mut self, event: &SseEvent) -> Result<Option<CanonicalResponse>> {
        let data = event.data.trim();
        if data == "[DONE]" {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(data) {
            Ok(value) => self.adapt_value(value),
            Err(e) => {
                warn!(error = %e, bytes = data.len(), "dropping non-JSON stream frame");
                Ok(None)
            }
        }
    }

    /// Adapt a complete non-streaming body.
    pub fn adapt_batch(&mut self, body: &str) -> Result<CanonicalResponse> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| Error::malformed("response", e.to_string()))?;
        let mut response = self.adapt_value(value)?.unwrap_or_default();
        if let Some(rest) = self.finish() {
            response.parts.extend(rest.parts);
        }
        response.usage = self.usage.clone();
        response.finish_reason = self.finish_reason.clone();
        Ok(response)
    }

    /// Adapt an already-parsed payload.
    pub fn adapt_value(&mut self, value: Value) -> Result<Option<CanonicalResponse>> {
        let value = unwrap_payload(value);
        if let Some(err) = parse_upstream_error(&value) {
            let status = err.code.unwrap_or(0);
            return Err(Error::Remote {
                status,
                message: rewrite_error(status, &err, self.model.as_deref()),
                endpoint: self.endpoint.clone(),
                attempts: 1,
            });
        }

        let chunk = if value.get("candidates").is_some() {
            self.adapt_gemini(&value)
        } else if let Some(kind) = value.get("type").and_then(|t| t.as_str()) {
            match kind {
                "message" => self.adapt_anthropic_message(&value),
                _ => self.adapt_anthropic_event(kind, &value),
            }
        } else {
            debug!("payload carries no recognised content shape");
            CanonicalResponse::default()
        };

        if chunk.parts.is_empty() {
            return Ok(None);
        }
        self.chunks += 1;
        Ok(Some(chunk))
    }

    /// Flush tool-use blocks still open at end of stream, repairing truncated input.
    pub fn finish(&mut self) -> Option<CanonicalResponse> {
        if self.pending_tools.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending_tools);
        let parts: Vec<ResponsePart> = pending
            .into_values()
            .map(|tool| self.finish_tool_use(tool))
            .collect();
        self.chunks += 1;
        Some(CanonicalResponse {
            parts,
            ..Default::default()
        })
    }

    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            usage: self.usage.clone(),
            finish_reason: self.finish_reason.clone(),
            chunks: self.chunks,
        }
    }

    fn observe_thought(&mut self, text: &str) {
        self.thought_buffer.push_str(text);
    }

    /// Record the buffered reasoning under `signature` and start a new buffer.
    fn observe_signature(&mut self, signature: &str) {
        if self.thought_buffer.trim().is_empty() {
            return;
        }
        self.caches.signatures.record_signature(
            self.family,
            &self.session_id,
            &self.thought_buffer,
            signature,
        );
        self.thought_buffer.clear();
    }

    fn function_call(
        &self,
        id: Option<String>,
        upstream_name: &str,
        args: Value,
        signature: Option<String>,
    ) -> ResponsePart {
        ResponsePart::FunctionCall {
            id,
            name: self.caches.tools.resolve_original_name(upstream_name),
            args: normalize_tool_args(upstream_name, args, &self.caches.tools),
            signature,
        }
    }

    fn finish_tool_use(&self, tool: PendingToolUse) -> ResponsePart {
        let raw = tool.json.trim();
        let args = if raw.is_empty() {
            json!({})
        } else {
            serde_json::from_str::<Value>(raw)
                .ok()
                .or_else(|| try_repair(raw).map(|(_, v)| v))
                .unwrap_or_else(|| Value::String(raw.to_string()))
        };
        self.function_call(tool.id, &tool.name, args, None)
    }

    fn adapt_gemini(&mut self, v: &Value) -> CanonicalResponse {
        let mut out = CanonicalResponse {
            model_version: str_field(v, "modelVersion"),
            response_id: str_field(v, "responseId"),
            ..Default::default()
        };
        if let Some(usage) = gemini_usage(v) {
            merge_usage(&mut self.usage, usage.clone());
            out.usage = Some(usage);
        }

        let candidate = v.get("candidates").and_then(|c| c.get(0));
        if let Some(reason) = candidate.and_then(|c| str_field(c, "finishReason")) {
            self.finish_reason = Some(reason.clone());
            out.finish_reason = Some(reason);
        }
        let parts = candidate
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array());
        let Some(parts) = parts else {
            return out;
        };

        for part in parts {
            let signature = str_field(part, "thoughtSignature")
                .or_else(|| str_field(part, "thought_signature"));
            let is_thought = part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false);

            if is_thought {
                let text = str_field(part, "text").unwrap_or_default();
                self.observe_thought(&text);
                if !text.is_empty() || signature.is_some() {
                    out.parts.push(ResponsePart::Thought {
                        text,
                        signature: signature.clone(),
                    });
                }
            } else if let Some(call) = part.get("functionCall") {
                let name = str_field(call, "name").unwrap_or_default();
                let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
                let id = str_field(call, "id");
                out.parts
                    .push(self.function_call(id, &name, args, signature.clone()));
            } else if let Some(resp) = part.get("functionResponse") {
                let name = str_field(resp, "name").unwrap_or_default();
                out.parts.push(ResponsePart::FunctionResponse {
                    id: str_field(resp, "id"),
                    name: self.caches.tools.resolve_original_name(&name),
                    response: normalize_function_response(
                        resp.get("response").cloned().unwrap_or(Value::Null),
                    ),
                });
            } else if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                if !text.is_empty() {
                    out.parts.push(ResponsePart::Text { text: text.to_string() });
                }
            }

            match &signature {
                Some(sig) => self.observe_signature(sig),
                // Reasoning is only correlated with a signature that directly follows it.
                None if !is_thought => self.thought_buffer.clear(),
                None => {}
            }
        }
        out
    }

    fn adapt_anthropic_message(&mut self, v: &Value) -> CanonicalResponse {
        let mut out = CanonicalResponse {
            model_version: str_field(v, "model"),
            response_id: str_field(v, "id"),
            ..Default::default()
        };
        if let Some(u) = v.get("usage") {
            let usage = anthropic_usage(u);
            merge_usage(&mut self.usage, usage.clone());
            out.usage = Some(usage);
        }
        if let Some(reason) = str_field(v, "stop_reason") {
            self.finish_reason = Some(reason.clone());
            out.finish_reason = Some(reason);
        }
        let blocks = v
            .get("content")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();
        for block in &blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = non_empty_str(block, "text") {
                        out.parts.push(ResponsePart::Text {
                            text: text.to_string(),
                        });
                    }
                    self.thought_buffer.clear();
                }
                Some("thinking") => {
                    let text = str_field(block, "thinking").unwrap_or_default();
                    let signature = str_field(block, "signature");
                    self.observe_thought(&text);
                    if let Some(sig) = &signature {
                        self.observe_signature(sig);
                    }
                    out.parts.push(ResponsePart::Thought { text, signature });
                }
                Some("tool_use") => {
                    let name = str_field(block, "name").unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    out.parts.push(self.function_call(str_field(block, "id"), &name, input, None));
                    self.thought_buffer.clear();
                }
                _ => {}
            }
        }
        out
    }

    fn adapt_anthropic_event(&mut self, kind: &str, v: &Value) -> CanonicalResponse {
        let mut out = CanonicalResponse::default();
        let index = u64_field(v, "index").unwrap_or(0);
        match kind {
            "message_start" => {
                if let Some(msg) = v.get("message") {
                    out.model_version = str_field(msg, "model");
                    out.response_id = str_field(msg, "id");
                    if let Some(u) = msg.get("usage") {
                        merge_usage(&mut self.usage, anthropic_usage(u));
                    }
                }
            }
            "content_block_start" => {
                let block = v.get("content_block").cloned().unwrap_or(Value::Null);
                match block.get("type").and_then(|t| t.as_str()) {
                    Some("tool_use") => {
                        self.thought_buffer.clear();
                        self.pending_tools.insert(
                            index,
                            PendingToolUse {
                                id: str_field(&block, "id"),
                                name: str_field(&block, "name").unwrap_or_default(),
                                json: String::new(),
                            },
                        );
                    }
                    Some("text") => {
                        self.thought_buffer.clear();
                        if let Some(text) = non_empty_str(&block, "text") {
                            out.parts.push(ResponsePart::Text {
                                text: text.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            "content_block_delta" => {
                let delta = v.get("delta").cloned().unwrap_or(Value::Null);
                match delta.get("type").and_then(|t| t.as_str()) {
                    Some("text_delta") => {
                        if let Some(text) = non_empty_str(&delta, "text") {
                            out.parts.push(ResponsePart::Text {
                                text: text.to_string(),
                            });
                        }
                    }
                    Some("thinking_delta") => {
                        let text = str_field(&delta, "thinking").unwrap_or_default();
                        self.observe_thought(&text);
                        if !text.is_empty() {
                            out.parts.push(ResponsePart::Thought { text, signature: None });
                        }
                    }
                    Some("signature_delta") => {
                        if let Some(sig) = str_field(&delta, "signature") {
                            self.observe_signature(&sig);
                            out.parts.push(ResponsePart::Thought {
                                text: String::new(),
                                signature: Some(sig),
                            });
                        }
                    }
                    Some("input_json_delta") => {
                        let fragment = delta.get("partial_json").and_then(|p| p.as_str());
                        if let (Some(tool), Some(fragment)) =
                            (self.pending_tools.get_mut(&index), fragment)
                        {
                            tool.json.push_str(fragment);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(tool) = self.pending_tools.remove(&index) {
                    out.parts.push(self.finish_tool_use(tool));
                }
            }
            "message_delta" => {
                if let Some(reason) = v.get("delta").and_then(|d| str_field(d, "stop_reason")) {
                    self.finish_reason = Some(reason.clone());
                    out.finish_reason = Some(reason);
                }
                if let Some(u) = v.get("usage") {
                    let usage = anthropic_usage(u);
                    merge_usage(&mut self.usage, usage.clone());
                    out.usage = Some(usage);
                }
            }
            _ => {}
        }
        out
    }
}
