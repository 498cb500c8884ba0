//! OAuth 2.0 wire calls: authorization URL, code exchange, refresh, revoke, user info.
//!
//! Two flavors are supported:
//!
//! | Flavor | Authorize query | Client credentials | User info |
//! |--------|-----------------|--------------------|-----------|
//! | Google | `scope`, `access_type=offline`, PKCE (S256) | POST body | `{email}` |
//! | iFlow | `loginMethod`, `type`, `redirect`, `state`, `client_id` | HTTP Basic | `{success, data:{apiKey,email,phone}}` |

use super::record::{AccountInfo, TokenRecord};
use crate::config::{ClientAuthMethod, OAuthConfig, OAuthFlavor};
use crate::error::{AuthError, ErrorContext};
use crate::transport::HttpTransport;
use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound of upstream error bodies carried in errors.
const MAX_ERROR_BODY: usize = 512;

/// A prepared interactive authorization.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub redirect_uri: String,
    /// PKCE verifier, when the flavor uses PKCE.
    pub code_verifier: Option<String>,
}

/// Single-use random state token.
pub fn generate_state() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge of a PKCE verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub fn build_authorization(
    config: &OAuthConfig,
    redirect_uri: &str,
) -> Result<AuthorizationRequest> {
    let state = generate_state();
    let mut url = url::Url::parse(&config.authorize_url).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid authorize url: {}", e),
            ErrorContext::new().with_field_path("oauth.authorize_url"),
        )
    })?;

    let code_verifier = match config.flavor {
        OAuthFlavor::Google => {
            let verifier = generate_state();
            url.query_pairs_mut()
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &config.scopes.join(" "))
                .append_pair("access_type", "offline")
                .append_pair("prompt", "consent")
                .append_pair("code_challenge", &pkce_challenge(&verifier))
                .append_pair("code_challenge_method", "S256")
                .append_pair("state", &state);
            Some(verifier)
        }
        OAuthFlavor::IFlow => {
            url.query_pairs_mut()
                .append_pair("loginMethod", "phone")
                .append_pair("type", "phone")
                .append_pair("redirect", redirect_uri)
                .append_pair("state", &state)
                .append_pair("client_id", &config.client_id);
            None
        }
    };

    Ok(AuthorizationRequest {
        url: url.to_string(),
        state,
        redirect_uri: redirect_uri.to_string(),
        code_verifier,
    })
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.trim().to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", body[..end].trim())
}

fn expires_in(v: &Value) -> Option<u64> {
    match v.get("expires_in")? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a token endpoint response into a record. The refresh token is only set
/// when the response carries one.
pub fn parse_token_response(body: &str) -> Result<TokenRecord> {
    let v: Value =
        serde_json::from_str(body).map_err(|e| Error::malformed("token response", e.to_string()))?;
    let access = v
        .get("access_token")
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingAccessToken)?;

    let mut record = TokenRecord::new(access);
    if let Some(refresh) = v
        .get("refresh_token")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
    {
        record = record.with_refresh_token(refresh);
    }
    if let Some(kind) = v.get("token_type").and_then(|t| t.as_str()).filter(|t| !t.is_empty()) {
        record.token_type = kind.to_string();
    }
    if let Some(secs) = expires_in(&v) {
        record = record.with_expires_in(secs);
    }
    Ok(record)
}

pub struct OAuthClient {
    config: OAuthConfig,
    http: HttpTransport,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig, http: HttpTransport) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TokenRecord> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }
        self.token_call(&form, cancel).await
    }

    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenRecord> {
        let form = [("grant_type", "refresh_token"), ("refresh_token", refresh_token)];
        self.token_call(&form, cancel).await
    }

    async fn token_call(
        &self,
        fields: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<TokenRecord> {
        let mut form: Vec<(&str, &str)> = fields.iter().copied().collect();
        let basic = match self.config.client_auth() {
            ClientAuthMethod::Basic => Some((
                self.config.client_id.as_str(),
                self.config.client_secret.as_str(),
            )),
            ClientAuthMethod::FormBody => {
                form.push(("client_id", &self.config.client_id));
                form.push(("client_secret", &self.config.client_secret));
                None
            }
        };
        let grant = form.first().map(|(_, g)| *g).unwrap_or_default().to_string();
        debug!(grant = %grant, token_url = %self.config.token_url, "token endpoint call");

        let (status, body) = self
            .http
            .post_form(&self.config.token_url, &form, basic, cancel)
            .await?;
        if !(200..300).contains(&status) {
            return Err(AuthError::TokenEndpoint {
                status,
                body: truncate_body(&body),
            }
            .into());
        }
        parse_token_response(&body)
    }

    /// Best-effort token revocation. Flavors without a revoke endpoint do nothing.
    pub async fn revoke(&self, token: &str, cancel: &CancellationToken) -> Result<()> {
        let Some(url) = &self.config.revoke_url else {
            return Ok(());
        };
        let (status, body) = self.http.post_form(url, &[("token", token)], None, cancel).await?;
        if !(200..300).contains(&status) {
            warn!(http_status = status, "token revocation rejected");
            return Err(AuthError::TokenEndpoint {
                status,
                body: truncate_body(&body),
            }
            .into());
        }
        Ok(())
    }

    pub async fn fetch_user_info(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<AccountInfo> {
        let Some(base) = &self.config.user_info_url else {
            return Ok(AccountInfo::default());
        };
        match self.config.flavor {
            OAuthFlavor::Google => {
                let mut headers = HeaderMap::new();
                let bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
                    .map_err(|e| AuthError::UserInfo(e.to_string()))?;
                headers.insert(AUTHORIZATION, bearer);
                let (status, body) = self.http.get(base, headers, cancel).await?;
                if !(200..300).contains(&status) {
                    return Err(user_info_status(status, &body));
                }
                let v: Value = serde_json::from_str(&body)
                    .map_err(|e| Error::malformed("user info", e.to_string()))?;
                Ok(AccountInfo {
                    email: v.get("email").and_then(|e| e.as_str()).map(String::from),
                    ..Default::default()
                })
            }
            OAuthFlavor::IFlow => {
                let mut url =
                    url::Url::parse(base).map_err(|e| AuthError::UserInfo(e.to_string()))?;
                url.query_pairs_mut().append_pair("accessToken", access_token);
                let (status, body) = self
                    .http
                    .get(url.as_str(), HeaderMap::new(), cancel)
                    .await?;
                if !(200..300).contains(&status) {
                    return Err(user_info_status(status, &body));
                }
                parse_iflow_user_info(&body)
            }
        }
    }
}

fn user_info_status(status: u16, body: &str) -> Error {
    AuthError::UserInfo(format!("HTTP {}: {}", status, truncate_body(body))).into()
}

/// Parse `{success, data: {apiKey, email, phone}}`.
pub fn parse_iflow_user_info(body: &str) -> Result<AccountInfo> {
    let v: Value =
        serde_json::from_str(body).map_err(|e| Error::malformed("user info", e.to_string()))?;
    if !v.get("success").and_then(|s| s.as_bool()).unwrap_or(false) {
        let message = v
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("user info request was not successful");
        return Err(AuthError::UserInfo(message.to_string()).into());
    }
    let data = v.get("data").cloned().unwrap_or(Value::Null);
    let field = |k: &str| {
        data.get(k)
            .and_then(|x| x.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let api_key = field("apiKey")
        .ok_or_else(|| AuthError::UserInfo("user info carried no apiKey".into()))?;
    Ok(AccountInfo {
        email: field("email").or_else(|| field("phone")),
        api_key: Some(api_key),
        ..Default::default()
    })
}
