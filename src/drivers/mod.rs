//! Provider 驱动抽象层：以组合代替继承的 Code Assist 提供方策略
//!
//! Provider driver abstraction. A driver owns everything that differs between the
//! gateways sharing the Code Assist envelope: default endpoints, identification
//! headers and the envelope identity. The orchestrator selects one by
//! [`ProviderKind`] and dispatches through `Box<dyn ProviderDriver>`.
//!
//! | Driver | Endpoints | Families |
//! |--------|-----------|----------|
//! | [`AntigravityDriver`] | sandbox (Claude), sandbox → prod (Gemini) | all |
//! | [`GeminiCliDriver`] | prod | Gemini only |

pub mod antigravity;
pub mod code_assist;
pub mod gemini_cli;

pub use antigravity::AntigravityDriver;
pub use gemini_cli::GeminiCliDriver;

use crate::config::{FeatureFlags, ProviderKind};
use crate::transform::{transform_request, TransformContext, TransformOutput};
use crate::types::{ChatRequest, ModelFamily};
use crate::Result;
use reqwest::header::HeaderMap;

/// Capability interface of one gateway flavor.
pub trait ProviderDriver: Send + Sync + std::fmt::Debug {
    fn provider_id(&self) -> &'static str;

    fn supports_family(&self, family: ModelFamily) -> bool;

    /// Ordered fallback base endpoints for `family`.
    fn default_endpoints(&self, family: ModelFamily) -> Vec<String>;

    /// Endpoints tried, in order, for account project discovery.
    fn discovery_endpoints(&self) -> Vec<String> {
        code_assist::LOAD_ENDPOINTS.iter().map(|e| e.to_string()).collect()
    }

    fn request_path(&self, stream: bool) -> &'static str {
        code_assist::request_path(stream)
    }

    /// Provider identification headers for one attempt against `endpoint`.
    fn build_headers(&self, family: ModelFamily, endpoint: &str) -> HeaderMap;

    /// `(userAgent, requestType)` written into the envelope.
    fn identity(&self) -> (&'static str, &'static str);

    fn build_request_body(
        &self,
        request: &ChatRequest,
        ctx: TransformContext,
        features: &FeatureFlags,
    ) -> Result<TransformOutput> {
        let (user_agent, request_type) = self.identity();
        let ctx = ctx.with_identity(user_agent, request_type);
        transform_request(request, &ctx, features)
    }
}

pub fn driver_for(kind: ProviderKind) -> Box<dyn ProviderDriver> {
    match kind {
        ProviderKind::Antigravity => Box::new(AntigravityDriver),
        ProviderKind::GeminiCli => Box::new(GeminiCliDriver),
    }
}
