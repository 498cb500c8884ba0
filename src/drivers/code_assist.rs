//! Shared pieces of the Code Assist gateway contract used by both drivers.

use crate::auth::AccountInfo;
use crate::transport::HttpTransport;
use crate::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const SANDBOX_ENDPOINT: &str = "https://daily-cloudcode-pa.sandbox.googleapis.com";
pub const PROD_ENDPOINT: &str = "https://cloudcode-pa.googleapis.com";

pub const STREAM_PATH: &str = "/v1internal:streamGenerateContent?alt=sse";
pub const GENERATE_PATH: &str = "/v1internal:generateContent";
pub const LOAD_CODE_ASSIST_PATH: &str = "/v1internal:loadCodeAssist";

/// Project used when discovery yields nothing and none is configured.
pub const DEFAULT_PROJECT_ID: &str = "rising-fact-p41fc";

pub const CLOUD_SHELL_USER_AGENT: &str = "google-cloud-sdk vscode_cloudshelleditor/0.1";
pub const LOAD_USER_AGENT: &str = "google-api-nodejs-client/9.15.1";
pub const API_CLIENT: &str = "google-cloud-sdk vscode_cloudshelleditor/0.1";
pub const GEMINI_CLI_API_CLIENT: &str = "gl-node/22.17.0";
pub const CLIENT_METADATA: &str =
    r#"{"ideType":"IDE_UNSPECIFIED","platform":"PLATFORM_UNSPECIFIED","pluginType":"GEMINI"}"#;

/// Project discovery tries prod first.
pub const LOAD_ENDPOINTS: &[&str] = &[PROD_ENDPOINT, SANDBOX_ENDPOINT];

pub fn is_sandbox(endpoint: &str) -> bool {
    endpoint.contains("sandbox.googleapis.com")
}

pub(crate) fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), v);
    }
}

/// Path for a generate call.
pub fn request_path(stream: bool) -> &'static str {
    if stream {
        STREAM_PATH
    } else {
        GENERATE_PATH
    }
}

fn load_body(project_hint: Option<&str>) -> Value {
    let mut metadata = json!({
        "ideType": "IDE_UNSPECIFIED",
        "platform": "PLATFORM_UNSPECIFIED",
        "pluginType": "GEMINI",
    });
    let hint = project_hint.filter(|h| !h.trim().is_empty());
    if let (Some(hint), Some(obj)) = (hint, metadata.as_object_mut()) {
        obj.insert("duetProject".into(), Value::String(hint.to_string()));
    }
    json!({ "metadata": metadata })
}

/// Extract project id and tier from a `loadCodeAssist` response.
pub fn parse_load_response(v: &Value) -> (Option<String>, Option<String>) {
    let project = v.get("cloudaicompanionProject").and_then(|p| match p {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(_) => p
            .get("id")
            .and_then(|id| id.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from),
        _ => None,
    });
    let tier = v
        .get("currentTier")
        .and_then(|t| t.get("id"))
        .and_then(|id| id.as_str())
        .map(String::from);
    (project, tier)
}

/// Discover the Code Assist project of an account.
///
/// Endpoints are tried in order; the first response with a project id wins. When
/// every endpoint fails the hint (or [`DEFAULT_PROJECT_ID`]) is returned.
pub async fn discover_project(
    http: &HttpTransport,
    endpoints: &[String],
    access_token: &str,
    project_hint: Option<&str>,
    cancel: &CancellationToken,
) -> Result<AccountInfo> {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, "authorization", &format!("Bearer {}", access_token));
    insert_header(&mut headers, "user-agent", LOAD_USER_AGENT);
    insert_header(&mut headers, "x-goog-api-client", API_CLIENT);
    insert_header(&mut headers, "client-metadata", CLIENT_METADATA);
    let body = load_body(project_hint);

    let mut last_error: Option<String> = None;
    let mut tier = None;
    for endpoint in endpoints {
        let url = format!("{}{}", endpoint.trim_end_matches('/'), LOAD_CODE_ASSIST_PATH);
        debug!(endpoint = %endpoint, "loadCodeAssist");
        let (status, text) = match http.post_json(&url, headers.clone(), &body, cancel).await {
            Ok(r) => r,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                last_error = Some(format!("{}: {}", endpoint, e));
                continue;
            }
        };
        if !(200..300).contains(&status) {
            last_error = Some(format!("{} HTTP {}", endpoint, status));
            continue;
        }
        let Ok(v) = serde_json::from_str::<Value>(&text) else {
            last_error = Some(format!("{}: invalid json", endpoint));
            continue;
        };
        let (project, found_tier) = parse_load_response(&v);
        tier = tier.or(found_tier);
        if let Some(project) = project {
            return Ok(AccountInfo {
                project_id: Some(project),
                tier,
                ..Default::default()
            });
        }
        last_error = Some(format!("{}: missing project id", endpoint));
    }

    if let Some(error) = last_error {
        warn!(error = %error, "project discovery failed, using fallback project id");
    }
    let fallback = project_hint
        .filter(|h| !h.trim().is_empty())
        .unwrap_or(DEFAULT_PROJECT_ID);
    Ok(AccountInfo {
        project_id: Some(fallback.to_string()),
        tier,
        ..Default::default()
    })
}
