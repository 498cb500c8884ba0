use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse model grouping that selects the wire format and feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "claude")]
    Claude,
    #[serde(rename = "gemini-flash")]
    GeminiFlash,
    #[serde(rename = "gemini-pro")]
    GeminiPro,
}

impl ModelFamily {
    /// Classify a model id. Anything that is neither Claude nor a Flash model is
    /// treated as Gemini Pro, the gateway's default tier.
    pub fn from_model_id(model: &str) -> Self {
        let m = model.to_ascii_lowercase();
        if m.contains("claude") {
            ModelFamily::Claude
        } else if m.contains("flash") {
            ModelFamily::GeminiFlash
        } else {
            ModelFamily::GeminiPro
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Claude => "claude",
            ModelFamily::GeminiFlash => "gemini-flash",
            ModelFamily::GeminiPro => "gemini-pro",
        }
    }

    pub fn is_gemini(&self) -> bool {
        !matches!(self, ModelFamily::Claude)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_gateway_model_ids() {
        assert_eq!(ModelFamily::from_model_id("claude-sonnet-4-5-thinking"), ModelFamily::Claude);
        assert_eq!(ModelFamily::from_model_id("gemini-2.5-flash"), ModelFamily::GeminiFlash);
        assert_eq!(ModelFamily::from_model_id("gemini-3-pro-high"), ModelFamily::GeminiPro);
        assert_eq!(ModelFamily::from_model_id("Gemini-2.5-Flash-Lite"), ModelFamily::GeminiFlash);
    }

    #[test]
    fn serializes_with_family_names() {
        assert_eq!(serde_json::to_value(ModelFamily::GeminiFlash).unwrap(), "gemini-flash");
        assert_eq!(ModelFamily::Claude.to_string(), "claude");
    }
}
