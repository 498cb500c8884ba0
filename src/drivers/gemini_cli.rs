use super::code_assist::{
    insert_header, CLIENT_METADATA, CLOUD_SHELL_USER_AGENT, GEMINI_CLI_API_CLIENT, PROD_ENDPOINT,
};
use super::ProviderDriver;
use crate::types::ModelFamily;
use reqwest::header::HeaderMap;

/// Gemini CLI flavor of the gateway: prod endpoint, Gemini families only.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiCliDriver;

impl ProviderDriver for GeminiCliDriver {
    fn provider_id(&self) -> &'static str {
        "gemini_cli"
    }

    fn supports_family(&self, family: ModelFamily) -> bool {
        family.is_gemini()
    }

    fn default_endpoints(&self, _family: ModelFamily) -> Vec<String> {
        vec![PROD_ENDPOINT.to_string()]
    }

    fn discovery_endpoints(&self) -> Vec<String> {
        vec![PROD_ENDPOINT.to_string()]
    }

    fn build_headers(&self, _family: ModelFamily, _endpoint: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "user-agent", CLOUD_SHELL_USER_AGENT);
        insert_header(&mut headers, "x-goog-api-client", GEMINI_CLI_API_CLIENT);
        insert_header(&mut headers, "client-metadata", CLIENT_METADATA);
        headers
    }

    fn identity(&self) -> (&'static str, &'static str) {
        ("gemini-cli", "agent")
    }
}
