//! 请求转换模块：规范请求 → 提供方线格式（Code Assist 信封）。
//!
//! # Request Transformer
//!
//! [`transform_request`] is a pure function of the canonical request, the
//! [`TransformContext`] and the feature flags. It performs no I/O and touches no cache;
//! tool names are sanitized with the pure [`crate::cache::sanitized_tool_name`], and the
//! orchestrator registers the reverse mapping separately.
//!
//! The inner body depends on the model family:
//!
//! | Family | Wire format |
//! |--------|-------------|
//! | `claude` | [`ClaudeMessagesFormat`] (Anthropic Messages) |
//! | `gemini-flash`, `gemini-pro` | [`GeminiContentsFormat`] (`generateContent`) |
//!
//! Both are wrapped in the same envelope:
//!
//! ```json
//! { "project": "...", "model": "...", "userAgent": "antigravity",
//!   "requestType": "agent", "requestId": "agent-...", "request": { ... } }
//! ```

pub mod claude;
pub mod context;
pub mod gemini;
pub mod schema;
pub mod thinking;

pub use claude::ClaudeMessagesFormat;
pub use context::{generate_request_id, process_session_id, TransformContext};
pub use gemini::GeminiContentsFormat;
pub use thinking::{resolve_thinking, ThinkingConfig, ThinkingMode};

use crate::config::FeatureFlags;
use crate::types::{ChatRequest, ModelFamily};
use crate::Result;
use serde::Serialize;
use serde_json::{json, Value};

/// Family-specific inner body builder.
pub trait WireFormat: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_request(
        &self,
        request: &ChatRequest,
        ctx: &TransformContext,
        features: &FeatureFlags,
    ) -> Value;
}

pub fn wire_format_for(family: ModelFamily) -> &'static dyn WireFormat {
    match family {
        ModelFamily::Claude => &ClaudeMessagesFormat,
        ModelFamily::GeminiFlash | ModelFamily::GeminiPro => &GeminiContentsFormat,
    }
}

/// Diagnostics about a transformed request. Never contains message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    pub wire_format: &'static str,
    pub family: ModelFamily,
    pub model: String,
    pub project: String,
    pub request_id: String,
    pub session_id: String,
    pub stream: bool,
    pub message_count: usize,
    pub tool_count: usize,
    pub thinking: Option<String>,
    pub body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Serialized envelope.
    pub body: String,
    pub debug_info: DebugInfo,
}

impl TransformOutput {
    pub fn body_json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

pub fn wrap_envelope(ctx: &TransformContext, inner: Value) -> Value {
    json!({
        "project": ctx.project,
        "model": ctx.model,
        "userAgent": ctx.user_agent,
        "requestType": ctx.request_type,
        "requestId": ctx.request_id,
        "request": inner,
    })
}

pub fn transform_request(
    request: &ChatRequest,
    ctx: &TransformContext,
    features: &FeatureFlags,
) -> Result<TransformOutput> {
    let format = wire_format_for(ctx.family);
    let inner = format.build_request(request, ctx, features);
    let body = serde_json::to_string(&wrap_envelope(ctx, inner))?;

    let representation = match ctx.family {
        ModelFamily::Claude => crate::config::ThinkingRepresentation::Budget,
        _ => features.thinking_representation,
    };
    let debug_info = DebugInfo {
        wire_format: format.name(),
        family: ctx.family,
        model: ctx.model.clone(),
        project: ctx.project.clone(),
        request_id: ctx.request_id.clone(),
        session_id: ctx.session_id.clone(),
        stream: ctx.stream,
        message_count: request.messages.len(),
        tool_count: request.tools.len(),
        thinking: resolve_thinking(request.generation.thinking.as_ref(), representation)
            .map(|t| t.describe()),
        body_bytes: body.len(),
    };
    Ok(TransformOutput { body, debug_info })
}
