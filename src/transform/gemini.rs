//! Gemini `generateContent` body.

use super::context::TransformContext;
use super::schema::gemini_parameters;
use super::thinking::resolve_thinking;
use super::WireFormat;
use crate::cache::sanitized_tool_name;
use crate::config::FeatureFlags;
use crate::types::{ChatRequest, ContentPart, GenerationConfig, MessageRole, ToolChoice};
use serde_json::{json, Map, Value};

pub struct GeminiContentsFormat;

fn gemini_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::Assistant => "model",
        _ => "user",
    }
}

/// `functionResponse.response` must be an object.
fn function_response_payload(content: &Value, is_error: bool) -> Value {
    match content {
        Value::Object(_) if !is_error => content.clone(),
        other if is_error => json!({ "error": other }),
        other => json!({ "output": other }),
    }
}

fn convert_part(part: &ContentPart) -> Option<Value> {
    match part {
        ContentPart::Text { text } => {
            if text.is_empty() {
                None
            } else {
                Some(json!({ "text": text }))
            }
        }
        // Unsigned thoughts are rejected upstream when resubmitted.
        ContentPart::Thinking { text, signature } => signature.as_ref().map(|sig| {
            json!({ "text": text, "thought": true, "thoughtSignature": sig })
        }),
        ContentPart::Image { media_type, data } => Some(json!({
            "inlineData": { "mimeType": media_type, "data": data }
        })),
        ContentPart::ToolCall { id, name, arguments } => {
            let mut call = Map::new();
            call.insert("name".into(), json!(sanitized_tool_name(name)));
            call.insert("args".into(), arguments.clone());
            if let Some(id) = id {
                call.insert("id".into(), json!(id));
            }
            Some(json!({ "functionCall": call }))
        }
        ContentPart::ToolResult {
            tool_call_id,
            name,
            content,
            is_error,
        } => {
            let mut resp = Map::new();
            resp.insert("name".into(), json!(sanitized_tool_name(name)));
            resp.insert("response".into(), function_response_payload(content, *is_error));
            if let Some(id) = tool_call_id {
                resp.insert("id".into(), json!(id));
            }
            Some(json!({ "functionResponse": resp }))
        }
    }
}

fn generation_config(gen: &GenerationConfig, features: &FeatureFlags) -> Map<String, Value> {
    let mut cfg = Map::new();
    if let Some(t) = gen.temperature {
        cfg.insert("temperature".into(), json!(t));
    }
    if let Some(p) = gen.top_p {
        cfg.insert("topP".into(), json!(p));
    }
    if let Some(k) = gen.top_k {
        cfg.insert("topK".into(), json!(k));
    }
    if let Some(m) = gen.max_output_tokens {
        cfg.insert("maxOutputTokens".into(), json!(m));
    }
    if let Some(p) = gen.presence_penalty {
        cfg.insert("presencePenalty".into(), json!(p));
    }
    if let Some(p) = gen.frequency_penalty {
        cfg.insert("frequencyPenalty".into(), json!(p));
    }
    if !gen.stop_sequences.is_empty() {
        cfg.insert("stopSequences".into(), json!(gen.stop_sequences));
    }
    let thinking = resolve_thinking(gen.thinking.as_ref(), features.thinking_representation);
    if let Some(thinking) = thinking {
        cfg.insert("thinkingConfig".into(), thinking.to_gemini());
    }
    cfg
}

fn tool_config(choice: &ToolChoice) -> Value {
    let (mode, allowed) = match choice {
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::None => ("NONE", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::Tool { name } => ("ANY", Some(sanitized_tool_name(name))),
    };
    let mut cfg = json!({ "mode": mode });
    if let Some(name) = allowed {
        cfg["allowedFunctionNames"] = json!([name]);
    }
    json!({ "functionCallingConfig": cfg })
}

/// Instruction text from `request.system` and any system-role messages, in order.
pub(crate) fn system_text(request: &ChatRequest) -> Option<String> {
    let mut sections: Vec<String> = Vec::new();
    if let Some(system) = request.system.as_deref().filter(|s| !s.trim().is_empty()) {
        sections.push(system.to_string());
    }
    for msg in request.messages.iter().filter(|m| m.role == MessageRole::System) {
        let text = msg.text();
        if !text.trim().is_empty() {
            sections.push(text);
        }
    }
    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

impl WireFormat for GeminiContentsFormat {
    fn name(&self) -> &'static str {
        "gemini-contents"
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        ctx: &TransformContext,
        features: &FeatureFlags,
    ) -> Value {
        // Consecutive same-role turns are merged; function responses for parallel
        // calls must share one user turn.
        let mut contents: Vec<(&'static str, Vec<Value>)> = Vec::new();
        for msg in request.messages.iter().filter(|m| m.role != MessageRole::System) {
            let parts: Vec<Value> = msg.content.iter().filter_map(convert_part).collect();
            if parts.is_empty() {
                continue;
            }
            let role = gemini_role(msg.role);
            match contents.last_mut() {
                Some((last_role, last_parts)) if *last_role == role => last_parts.extend(parts),
                _ => contents.push((role, parts)),
            }
        }

        let mut body = Map::new();
        body.insert(
            "contents".into(),
            Value::Array(
                contents
                    .into_iter()
                    .map(|(role, parts)| json!({ "role": role, "parts": parts }))
                    .collect(),
            ),
        );

        if let Some(system) = system_text(request) {
            body.insert(
                "systemInstruction".into(),
                json!({ "role": "user", "parts": [{ "text": system }] }),
            );
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    let mut decl = Map::new();
                    decl.insert("name".into(), json!(sanitized_tool_name(&tool.name)));
                    if let Some(desc) = &tool.description {
                        decl.insert("description".into(), json!(desc));
                    }
                    decl.insert("parameters".into(), gemini_parameters(tool.parameters.as_ref()));
                    Value::Object(decl)
                })
                .collect();
            body.insert("tools".into(), json!([{ "functionDeclarations": declarations }]));
        }

        if let Some(choice) = &request.tool_choice {
            body.insert("toolConfig".into(), tool_config(choice));
        }

        let gen = generation_config(&request.generation, features);
        if !gen.is_empty() {
            body.insert("generationConfig".into(), Value::Object(gen));
        }

        body.insert("sessionId".into(), json!(ctx.session_id));
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThinkingRepresentation;
    use crate::types::{Message, ThinkingEffort, ThinkingRequest, ToolDefinition};

    fn ctx() -> TransformContext {
        TransformContext::new("gemini-2.5-flash", "proj-1", true, "sess-1")
    }

    #[test]
    fn maps_roles_system_and_merges_tool_results() {
        let request = ChatRequest::new(
            "gemini-2.5-flash",
            vec![
                Message::system("be brief"),
                Message::user("weather in Oslo and Bergen?"),
                Message::with_parts(
                    MessageRole::Assistant,
                    vec![
                        ContentPart::tool_call(
                            Some("a".into()),
                            "1weather",
                            json!({"city": "Oslo"}),
                        ),
                        ContentPart::tool_call(
                            Some("b".into()),
                            "1weather",
                            json!({"city": "Bergen"}),
                        ),
                    ],
                ),
                Message::tool_result(Some("a".into()), "1weather", json!("rain")),
                Message::tool_result(Some("b".into()), "1weather", json!({"sky": "clear"})),
            ],
        )
        .system("you are a forecaster");

        let body = GeminiContentsFormat.build_request(&request, &ctx(), &FeatureFlags::default());
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "t_1weather");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"].as_array().unwrap().len(), 2);
        let results = contents[2]["parts"].as_array().unwrap();
        assert_eq!(results[0]["functionResponse"]["response"], json!({"output": "rain"}));
        assert_eq!(results[1]["functionResponse"]["response"], json!({"sky": "clear"}));
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "you are a forecaster\n\nbe brief"
        );
        assert_eq!(body["sessionId"], "sess-1");
    }

    #[test]
    fn thinking_key_follows_feature_flag() {
        let request = ChatRequest::new("gemini-3-pro", vec![Message::user("hi")])
            .thinking(ThinkingRequest::effort(ThinkingEffort::XHigh));

        let level = FeatureFlags {
            thinking_representation: ThinkingRepresentation::Level,
            ..FeatureFlags::default()
        };
        let body = GeminiContentsFormat.build_request(&request, &ctx(), &level);
        let tc = &body["generationConfig"]["thinkingConfig"];
        assert_eq!(tc["thinkingLevel"], "high");
        assert!(tc.get("thinkingBudget").is_none());

        let body = GeminiContentsFormat.build_request(&request, &ctx(), &FeatureFlags::default());
        let tc = &body["generationConfig"]["thinkingConfig"];
        assert_eq!(tc["thinkingBudget"], -1);
        assert!(tc.get("thinkingLevel").is_none());
    }

    #[test]
    fn declares_tools_and_tool_choice() {
        let request = ChatRequest::new("gemini-2.5-pro", vec![Message::user("go")])
            .tools(vec![ToolDefinition::new("search").with_description("web search")])
            .tool_choice(ToolChoice::Tool { name: "search".into() });
        let body = GeminiContentsFormat.build_request(&request, &ctx(), &FeatureFlags::default());
        let decl = &body["tools"][0]["functionDeclarations"][0];
        assert_eq!(decl["name"], "search");
        assert_eq!(decl["parameters"]["type"], "object");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
        assert_eq!(
            body["toolConfig"]["functionCallingConfig"]["allowedFunctionNames"],
            json!(["search"])
        );
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn unsigned_thinking_is_not_resubmitted() {
        let request = ChatRequest::new(
            "gemini-2.5-pro",
            vec![Message::with_parts(
                MessageRole::Assistant,
                vec![
                    ContentPart::thinking("unsigned", None),
                    ContentPart::thinking("signed", Some("sig".into())),
                    ContentPart::text("answer"),
                ],
            )],
        );
        let body = GeminiContentsFormat.build_request(&request, &ctx(), &FeatureFlags::default());
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["thoughtSignature"], "sig");
        assert_eq!(parts[0]["thought"], true);
    }
}
