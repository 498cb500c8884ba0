use super::code_assist::{
    insert_header, is_sandbox, API_CLIENT, CLIENT_METADATA, CLOUD_SHELL_USER_AGENT,
    GEMINI_CLI_API_CLIENT, PROD_ENDPOINT, SANDBOX_ENDPOINT,
};
use super::ProviderDriver;
use crate::types::ModelFamily;
use once_cell::sync::Lazy;
use reqwest::header::HeaderMap;

const USER_AGENT_PREFIX: &str = "antigravity/1.11.5";

static SANDBOX_USER_AGENT: Lazy<String> = Lazy::new(|| {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{} {}/{}", USER_AGENT_PREFIX, os, arch)
});

/// Antigravity gateway. Claude models are only served by the sandbox endpoint;
/// Gemini models fall back from sandbox to prod.
#[derive(Debug, Clone, Copy, Default)]
pub struct AntigravityDriver;

impl AntigravityDriver {
    pub fn user_agent_for(endpoint: &str) -> &'static str {
        if is_sandbox(endpoint) {
            SANDBOX_USER_AGENT.as_str()
        } else {
            CLOUD_SHELL_USER_AGENT
        }
    }
}

impl ProviderDriver for AntigravityDriver {
    fn provider_id(&self) -> &'static str {
        "antigravity"
    }

    fn supports_family(&self, _family: ModelFamily) -> bool {
        true
    }

    fn default_endpoints(&self, family: ModelFamily) -> Vec<String> {
        match family {
            ModelFamily::Claude => vec![SANDBOX_ENDPOINT.to_string()],
            _ => vec![SANDBOX_ENDPOINT.to_string(), PROD_ENDPOINT.to_string()],
        }
    }

    fn build_headers(&self, _family: ModelFamily, endpoint: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "user-agent", Self::user_agent_for(endpoint));
        let api_client = if is_sandbox(endpoint) {
            API_CLIENT
        } else {
            GEMINI_CLI_API_CLIENT
        };
        insert_header(&mut headers, "x-goog-api-client", api_client);
        insert_header(&mut headers, "client-metadata", CLIENT_METADATA);
        headers
    }

    fn identity(&self) -> (&'static str, &'static str) {
        ("antigravity", "agent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_uses_sandbox_only() {
        let d = AntigravityDriver;
        assert_eq!(d.default_endpoints(ModelFamily::Claude), vec![SANDBOX_ENDPOINT.to_string()]);
        assert_eq!(d.default_endpoints(ModelFamily::GeminiFlash).len(), 2);
    }

    #[test]
    fn headers_follow_endpoint() {
        let d = AntigravityDriver;
        let sandbox = d.build_headers(ModelFamily::GeminiPro, SANDBOX_ENDPOINT);
        assert!(sandbox["user-agent"].to_str().unwrap().starts_with("antigravity/1.11.5 "));
        assert_eq!(sandbox["x-goog-api-client"], API_CLIENT);
        let prod = d.build_headers(ModelFamily::GeminiPro, PROD_ENDPOINT);
        assert_eq!(prod["user-agent"], CLOUD_SHELL_USER_AGENT);
        assert_eq!(prod["x-goog-api-client"], GEMINI_CLI_API_CLIENT);
    }
}
