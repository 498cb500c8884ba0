use crate::auth::{Credential, CredentialProvider};
use crate::cache::SharedCaches;
use crate::config::BridgeConfig;
use crate::drivers::code_assist::DEFAULT_PROJECT_ID;
use crate::drivers::ProviderDriver;
use crate::error::ErrorContext;
use crate::transform::{DebugInfo, TransformContext};
use crate::transport::HttpTransport;
use crate::types::{ChatRequest, ContentPart, ModelFamily};
use crate::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::builder::ProviderClientBuilder;

/// Capability header sent to Claude models when interleaved thinking is enabled.
pub const INTERLEAVED_THINKING_BETA: &str = "interleaved-thinking-2025-05-14";

/// Orchestrator for calls against the Code Assist gateway.
///
/// One client serves any number of concurrent calls. Each call resolves a
/// credential, transforms the request, then tries the endpoints in order.
pub struct ProviderClient {
    pub(crate) config: BridgeConfig,
    pub(crate) driver: Box<dyn ProviderDriver>,
    pub(crate) transport: HttpTransport,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) caches: SharedCaches,
    pub(crate) session_id: String,
}

/// Everything an attempt loop needs, computed once per call.
pub(crate) struct PreparedCall {
    pub model: String,
    pub family: ModelFamily,
    pub request_id: String,
    pub body: String,
    pub endpoints: Vec<String>,
    pub extra_headers: BTreeMap<String, String>,
    pub credential: Credential,
    pub debug_info: DebugInfo,
}

impl ProviderClient {
    pub fn builder(config: BridgeConfig) -> ProviderClientBuilder {
        ProviderClientBuilder::new(config)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn caches(&self) -> &SharedCaches {
        &self.caches
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn driver(&self) -> &dyn ProviderDriver {
        self.driver.as_ref()
    }

    /// Configured endpoints, or the driver defaults for `family`.
    pub fn resolve_endpoints(&self, family: ModelFamily) -> Result<Vec<String>> {
        let endpoints = if self.config.endpoints.is_empty() {
            self.driver.default_endpoints(family)
        } else {
            self.config.endpoints.clone()
        };
        if endpoints.is_empty() {
            return Err(Error::validation_with_context(
                "no endpoints to try",
                ErrorContext::new()
                    .with_field_path("endpoints")
                    .with_source(self.driver.provider_id()),
            ));
        }
        Ok(endpoints)
    }

    /// Fill missing signatures on thinking parts from the signature cache.
    pub fn reattach_signatures(&self, request: &ChatRequest, family: ModelFamily) -> ChatRequest {
        let mut request = request.clone();
        for message in &mut request.messages {
            for part in &mut message.content {
                if let ContentPart::Thinking { text, signature } = part {
                    if signature.is_none() {
                        *signature = self
                            .caches
                            .signatures
                            .lookup_signature(family, &self.session_id, text);
                    }
                }
            }
        }
        request
    }

    pub(crate) async fn prepare(
        &self,
        request: &ChatRequest,
        stream: bool,
        cancel: &CancellationToken,
    ) -> Result<PreparedCall> {
        let family = ModelFamily::from_model_id(&request.model);
        if !self.driver.supports_family(family) {
            return Err(Error::validation_with_context(
                format!("{} does not serve model family {}", self.driver.provider_id(), family),
                ErrorContext::new().with_field_path("model").with_details(request.model.clone()),
            ));
        }
        let endpoints = self.resolve_endpoints(family)?;

        let credential = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            c = self.credentials.credential() => c?,
        };

        self.caches.tools.cache_schemas(&request.tools);
        let request = self.reattach_signatures(request, family);

        let project = self
            .config
            .project_id
            .clone()
            .or_else(|| credential.project_id.clone())
            .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());
        let ctx = TransformContext::new(&request.model, project, stream, &self.session_id)
            .with_family(family);
        let request_id = ctx.request_id.clone();
        let output = self
            .driver
            .build_request_body(&request, ctx, &self.config.features)?;
        debug!(
            request_id = %request_id,
            wire_format = output.debug_info.wire_format,
            body_bytes = output.debug_info.body_bytes,
            thinking = ?output.debug_info.thinking,
            "request transformed"
        );

        Ok(PreparedCall {
            model: request.model.clone(),
            family,
            request_id,
            body: output.body,
            endpoints,
            extra_headers: request.headers.clone(),
            credential,
            debug_info: output.debug_info,
        })
    }

    /// Headers of one attempt: static, per-call and per-model extras, then bearer
    /// authorization, provider identification and capability headers.
    pub(crate) fn build_headers(&self, call: &PreparedCall, endpoint: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let model_extras = self.config.model_headers.get(&call.model);
        let layers = [Some(&self.config.headers), Some(&call.extra_headers), model_extras];
        for (name, value) in layers.into_iter().flatten().flat_map(|m| m.iter()) {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::validation_with_context(
                    format!("invalid header name: {}", e),
                    ErrorContext::new().with_field_path(format!("headers.{}", name)),
                )
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                Error::validation_with_context(
                    format!("invalid header value: {}", e),
                    ErrorContext::new().with_field_path(format!("headers.{}", name)),
                )
            })?;
            headers.insert(header_name, header_value);
        }

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", call.credential.access_token))
            .map_err(|_| {
                Error::validation_with_context(
                    "access token is not a valid header value",
                    ErrorContext::new(),
                )
            })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        for (name, value) in self.driver.build_headers(call.family, endpoint) {
            if let Some(name) = name {
                headers.insert(name, value);
            }
        }

        if call.family == ModelFamily::Claude && self.config.features.interleaved_thinking {
            headers.insert(
                HeaderName::from_static("anthropic-beta"),
                HeaderValue::from_static(INTERLEAVED_THINKING_BETA),
            );
        }
        Ok(headers)
    }
}
