use super::generation::{GenerationConfig, ThinkingRequest};
use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical chat request. Built once per call and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub stream: bool,
    /// Per-call HTTP headers, merged over the configured static headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            tools: Vec::new(),
            tool_choice: None,
            generation: GenerationConfig::default(),
            stream: false,
            headers: BTreeMap::new(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn temperature(mut self, temp: f64) -> Self {
        self.generation.temperature = Some(temp);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.generation.top_p = Some(top_p);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.generation.max_output_tokens = Some(max);
        self
    }

    pub fn thinking(mut self, thinking: ThinkingRequest) -> Self {
        self.generation.thinking = Some(thinking);
        self
    }

    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
