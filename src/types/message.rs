//! Canonical chat message format

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Canonical message: a role plus ordered content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_parts(MessageRole::System, vec![ContentPart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_parts(MessageRole::User, vec![ContentPart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_parts(MessageRole::Assistant, vec![ContentPart::text(text)])
    }

    /// A tool message carrying a single tool result.
    pub fn tool_result(
        tool_call_id: Option<String>,
        name: impl Into<String>,
        content: Value,
    ) -> Self {
        Self::with_parts(
            MessageRole::Tool,
            vec![ContentPart::ToolResult {
                tool_call_id,
                name: name.into(),
                content,
                is_error: false,
            }],
        )
    }

    pub fn with_parts(role: MessageRole, content: Vec<ContentPart>) -> Self {
        Self { role, content }
    }

    /// Concatenated text parts, ignoring thinking and tool parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|p| matches!(p, ContentPart::ToolCall { .. }))
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Content part of a canonical message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Reasoning emitted by the model on a previous turn.
    Thinking {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    Image {
        media_type: String,
        /// base64 payload
        data: String,
    },
    ToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        arguments: Value,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        name: String,
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn thinking(text: impl Into<String>, signature: Option<String>) -> Self {
        ContentPart::Thinking {
            text: text.into(),
            signature,
        }
    }

    pub fn tool_call(id: Option<String>, name: impl Into<String>, arguments: Value) -> Self {
        ContentPart::ToolCall {
            id,
            name: name.into(),
            arguments,
        }
    }

    pub fn image_base64(data: String, media_type: impl Into<String>) -> Self {
        ContentPart::Image {
            media_type: media_type.into(),
            data,
        }
    }

    pub fn image_from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let media_type =
            guess_media_type(path).unwrap_or_else(|| "application/octet-stream".into());
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(Self::image_base64(data, media_type))
    }
}

fn guess_media_type(path: &Path) -> Option<String> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let mt = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => return None,
    };
    Some(mt.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_serialize_with_type_tag() {
        let msg = Message::with_parts(
            MessageRole::Assistant,
            vec![
                ContentPart::thinking("let me see", Some("sig".into())),
                ContentPart::tool_call(Some("c1".into()), "lookup", json!({"q": "x"})),
            ],
        );
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["content"][0]["type"], "thinking");
        assert_eq!(v["content"][1]["type"], "tool_call");
        assert!(msg.has_tool_calls());
        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn text_skips_non_text_parts() {
        let msg = Message::with_parts(
            MessageRole::Assistant,
            vec![
                ContentPart::thinking("hidden", None),
                ContentPart::text("a"),
                ContentPart::text("b"),
            ],
        );
        assert_eq!(msg.text(), "ab");
    }
}
