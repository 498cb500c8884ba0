use crate::types::ModelFamily;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use uuid::Uuid;

pub const DEFAULT_USER_AGENT: &str = "antigravity";
pub const DEFAULT_REQUEST_TYPE: &str = "agent";

static PROCESS_SESSION_ID: Lazy<String> = Lazy::new(|| format!("-{}", Uuid::new_v4().simple()));

/// Session id shared by every call of this process. Reasoning signatures are
/// correlated across turns under it.
pub fn process_session_id() -> &'static str {
    PROCESS_SESSION_ID.as_str()
}

/// Fresh per-call request id.
pub fn generate_request_id() -> String {
    format!("agent-{}", URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes()))
}

/// Per-call inputs to the transformer that are not part of the canonical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformContext {
    pub model: String,
    pub family: ModelFamily,
    pub project: String,
    pub stream: bool,
    pub request_id: String,
    pub session_id: String,
    pub user_agent: String,
    pub request_type: String,
}

impl TransformContext {
    pub fn new(
        model: impl Into<String>,
        project: impl Into<String>,
        stream: bool,
        session_id: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            family: ModelFamily::from_model_id(&model),
            model,
            project: project.into(),
            stream,
            request_id: generate_request_id(),
            session_id: session_id.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_type: DEFAULT_REQUEST_TYPE.to_string(),
        }
    }

    pub fn with_identity(
        mut self,
        user_agent: impl Into<String>,
        request_type: impl Into<String>,
    ) -> Self {
        self.user_agent = user_agent.into();
        self.request_type = request_type.into();
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }

    pub fn with_family(mut self, family: ModelFamily) -> Self {
        self.family = family;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique_session_is_stable() {
        let a = TransformContext::new("gemini-2.5-pro", "p", true, process_session_id());
        let b = TransformContext::new("gemini-2.5-pro", "p", true, process_session_id());
        assert_ne!(a.request_id, b.request_id);
        assert!(a.request_id.starts_with("agent-"));
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.family, ModelFamily::GeminiPro);
    }
}
