use serde::{Deserialize, Serialize};

/// Caller-facing reasoning effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingEffort {
    Minimal,
    Low,
    Medium,
    High,
    #[serde(rename = "xhigh")]
    XHigh,
    /// Thinking disabled.
    None,
}

/// Thinking request. Either field may be absent; `effort = None` or `budget_tokens = 0`
/// means "disabled".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThinkingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<ThinkingEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<i64>,
}

impl ThinkingRequest {
    pub fn effort(effort: ThinkingEffort) -> Self {
        Self {
            effort: Some(effort),
            budget_tokens: None,
        }
    }

    pub fn budget(tokens: i64) -> Self {
        Self {
            effort: None,
            budget_tokens: Some(tokens),
        }
    }

    pub fn disabled() -> Self {
        Self::effort(ThinkingEffort::None)
    }

    pub fn is_disabled(&self) -> bool {
        self.effort == Some(ThinkingEffort::None) || self.budget_tokens == Some(0)
    }
}

/// Provider-agnostic generation parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingRequest>,
}
