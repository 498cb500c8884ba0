//! 桥接配置：YAML 文件加载 + `AI_*` 环境变量覆盖。
//!
//! Bridge configuration. Everything the orchestrator, transformer and token manager
//! need that is not per-call lives here. Files are YAML; every field has a default so
//! an empty document is valid.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Which Code Assist client the bridge identifies as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Antigravity,
    GeminiCli,
}

/// How thinking configuration is expressed to Gemini-family targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingRepresentation {
    /// Named level (`thinkingLevel`)
    Level,
    /// Numeric token budget (`thinkingBudget`)
    #[default]
    Budget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub thinking_representation: ThinkingRepresentation,
    /// Send the interleaved-thinking capability header for Claude-family models.
    pub interleaved_thinking: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            thinking_representation: ThinkingRepresentation::Budget,
            interleaved_thinking: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout for non-streaming calls.
    pub request_secs: u64,
    pub connect_secs: u64,
    /// Maximum gap between two adapted chunks of a stream.
    pub idle_timeout_secs: u64,
    /// How long `authorize()` waits for the loopback callback.
    pub callback_timeout_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            connect_secs: 10,
            idle_timeout_secs: 60,
            callback_timeout_secs: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn callback(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub proxy_url: Option<String>,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            pool_max_idle_per_host: 32,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// OAuth provider family. Decides how client credentials travel and how account
/// metadata is fetched after an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OAuthFlavor {
    /// Google accounts: credentials in the form body, scopes on the authorize URL.
    #[default]
    Google,
    /// iFlow accounts: HTTP Basic credentials, phone login parameters.
    IFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    Basic,
    FormBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub flavor: OAuthFlavor,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: Option<String>,
    pub user_info_url: Option<String>,
    pub scopes: Vec<String>,
    /// Loopback port of the callback listener. `0` binds an ephemeral port.
    pub callback_port: u16,
    pub callback_path: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::google(String::new(), String::new())
    }
}

impl OAuthConfig {
    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            flavor: OAuthFlavor::Google,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            revoke_url: Some("https://oauth2.googleapis.com/revoke".to_string()),
            user_info_url: Some(
                "https://www.googleapis.com/oauth2/v1/userinfo?alt=json".to_string(),
            ),
            scopes: [
                "https://www.googleapis.com/auth/cloud-platform",
                "https://www.googleapis.com/auth/userinfo.email",
                "https://www.googleapis.com/auth/userinfo.profile",
                "https://www.googleapis.com/auth/cclog",
                "https://www.googleapis.com/auth/experimentsandconfigs",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            callback_port: 51121,
            callback_path: "/oauth-callback".to_string(),
        }
    }

    pub fn iflow(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            flavor: OAuthFlavor::IFlow,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: "https://iflow.cn/oauth".to_string(),
            token_url: "https://iflow.cn/oauth/token".to_string(),
            revoke_url: None,
            user_info_url: Some("https://iflow.cn/api/oauth/getUserInfo".to_string()),
            scopes: Vec::new(),
            callback_port: 11451,
            callback_path: "/oauth2callback".to_string(),
        }
    }

    pub fn client_auth(&self) -> ClientAuthMethod {
        match self.flavor {
            OAuthFlavor::Google => ClientAuthMethod::FormBody,
            OAuthFlavor::IFlow => ClientAuthMethod::Basic,
        }
    }

    pub fn redirect_uri(&self, port: u16) -> String {
        format!("http://localhost:{}{}", port, self.callback_path)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub provider: ProviderKind,
    /// Ordered fallback base URLs. Empty means "use the provider defaults".
    pub endpoints: Vec<String>,
    /// Overrides the project discovered for the account.
    pub project_id: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Extra headers keyed by model id.
    pub model_headers: BTreeMap<String, BTreeMap<String, String>>,
    pub features: FeatureFlags,
    pub timeouts: TimeoutConfig,
    pub transport: TransportConfig,
    pub oauth: OAuthConfig,
    pub signature_cache_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Antigravity,
            endpoints: Vec::new(),
            project_id: None,
            headers: BTreeMap::new(),
            model_headers: BTreeMap::new(),
            features: FeatureFlags::default(),
            timeouts: TimeoutConfig::default(),
            transport: TransportConfig::default(),
            oauth: OAuthConfig::default(),
            signature_cache_capacity: crate::cache::DEFAULT_SIGNATURE_CAPACITY,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl BridgeConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            Error::configuration_with_context(
                "invalid bridge configuration",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            Error::Configuration { message, context } => Error::Configuration {
                message,
                context: context.with_field_path(path.display().to_string()),
            },
            other => other,
        })
    }

    /// Apply `AI_*` environment overrides on top of the loaded values.
    pub fn apply_env(mut self) -> Self {
        if let Some(secs) = env_parse::<u64>("AI_HTTP_TIMEOUT_SECS") {
            self.timeouts.request_secs = secs;
        }
        if let Some(proxy) = env_string("AI_PROXY_URL") {
            self.transport.proxy_url = Some(proxy);
        }
        if let Some(n) = env_parse::<usize>("AI_HTTP_POOL_MAX_IDLE_PER_HOST") {
            self.transport.pool_max_idle_per_host = n;
        }
        if let Some(secs) = env_parse::<u64>("AI_HTTP_POOL_IDLE_TIMEOUT_SECS") {
            self.transport.pool_idle_timeout_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("AI_BRIDGE_IDLE_TIMEOUT_SECS") {
            self.timeouts.idle_timeout_secs = secs;
        }
        if let Some(project) = env_string("AI_BRIDGE_PROJECT_ID") {
            self.project_id = Some(project);
        }
        if let Some(list) = env_string("AI_BRIDGE_ENDPOINTS") {
            self.endpoints = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(id) = env_string("AI_BRIDGE_OAUTH_CLIENT_ID") {
            self.oauth.client_id = id;
        }
        if let Some(secret) = env_string("AI_BRIDGE_OAUTH_CLIENT_SECRET") {
            self.oauth.client_secret = secret;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            let parsed = url::Url::parse(endpoint).map_err(|e| {
                Error::configuration_with_context(
                    "endpoint is not a valid URL",
                    ErrorContext::new()
                        .with_field_path(format!("endpoints[{}]", i))
                        .with_details(e.to_string()),
                )
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Error::configuration_with_context(
                    "endpoint must use http or https",
                    ErrorContext::new()
                        .with_field_path(format!("endpoints[{}]", i))
                        .with_details(endpoint.clone()),
                ));
            }
        }
        if self.timeouts.idle_timeout_secs == 0 {
            return Err(Error::configuration_with_context(
                "idle timeout must be greater than zero",
                ErrorContext::new().with_field_path("timeouts.idle_timeout_secs"),
            ));
        }
        if self.signature_cache_capacity == 0 {
            return Err(Error::configuration_with_context(
                "signature cache capacity must be greater than zero",
                ErrorContext::new().with_field_path("signature_cache_capacity"),
            ));
        }
        Ok(())
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_project_id(mut self, project: impl Into<String>) -> Self {
        self.project_id = Some(project.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_model_header(
        mut self,
        model: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.model_headers
            .entry(model.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.idle_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_oauth(mut self, oauth: OAuthConfig) -> Self {
        self.oauth = oauth;
        self
    }
}
