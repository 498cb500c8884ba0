//! Upstream error bodies → user-facing messages.
//!
//! Two shapes get a clearer message: preview-model access denials and rate-limit /
//! quota exhaustion. The latter keeps any retry hint the upstream gave. Everything else
//! passes through as the upstream's own message text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RETRY_IN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:retry|try again|reset)\s+(?:in|after)\s+(\d+(?:\.\d+)?)\s*(ms|s|seconds?)\b",
    )
    .ok()
});

/// Parsed upstream error payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpstreamError {
    pub code: Option<u16>,
    /// Canonical status string such as `RESOURCE_EXHAUSTED`.
    pub status: Option<String>,
    pub message: String,
    pub retry_delay: Option<String>,
}

fn error_object(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(error_object),
        Value::Object(map) => map
            .get("error")
            .or_else(|| map.get("response").and_then(error_object)),
        _ => None,
    }
}

fn retry_delay_from_details(err: &Value) -> Option<String> {
    err.get("details")?
        .as_array()?
        .iter()
        .find_map(|d| d.get("retryDelay").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

/// Parse an error payload. `None` when `value` carries no `error` member.
pub fn parse_upstream_error(value: &Value) -> Option<UpstreamError> {
    let err = error_object(value)?;
    Some(match err {
        Value::String(message) => UpstreamError {
            message: message.clone(),
            ..Default::default()
        },
        other => UpstreamError {
            code: other
                .get("code")
                .and_then(|c| c.as_u64())
                .and_then(|c| u16::try_from(c).ok()),
            status: other
                .get("status")
                .and_then(|s| s.as_str())
                .map(|s| s.to_string()),
            message: other
                .get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| other.to_string()),
            retry_delay: retry_delay_from_details(other),
        },
    })
}

/// Best-effort message extraction from an error body (JSON or plain text).
pub fn extract_error(body: &str) -> UpstreamError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    if let Some(err) = parsed.as_ref().and_then(parse_upstream_error) {
        return err;
    }
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| body.trim().to_string());
    UpstreamError {
        message,
        ..Default::default()
    }
}

fn retry_hint(err: &UpstreamError) -> Option<String> {
    if let Some(delay) = &err.retry_delay {
        return Some(delay.clone());
    }
    let re = RETRY_IN.as_ref()?;
    let caps = re.captures(&err.message)?;
    let amount = caps.get(1)?.as_str();
    let unit = match caps.get(2).map(|u| u.as_str().to_ascii_lowercase()) {
        Some(u) if u == "ms" => "ms",
        _ => "s",
    };
    Some(format!("{}{}", amount, unit))
}

static PREVIEW_MODEL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)\bpreview models?\b|\bmodel\b.*\bpreview\b|\bpreview\b.*\bmodel\b").ok()
});

/// Permission denial for a preview model, or the 404 Code Assist returns for models the
/// project cannot see.
fn is_preview_denial(status: u16, err: &UpstreamError) -> bool {
    let permission_denied = status == 403
        || err.code == Some(403)
        || err.status.as_deref() == Some("PERMISSION_DENIED");
    let about_preview = PREVIEW_MODEL
        .as_ref()
        .is_some_and(|re| re.is_match(&err.message));
    let not_found = status == 404
        || err.code == Some(404)
        || err.status.as_deref() == Some("NOT_FOUND");
    let missing = not_found
        && err
            .message
            .to_ascii_lowercase()
            .contains("requested entity was not found");
    (permission_denied && about_preview) || missing
}

fn is_rate_limit(status: u16, err: &UpstreamError) -> bool {
    let m = err.message.to_ascii_lowercase();
    status == 429
        || err.code == Some(429)
        || err.status.as_deref() == Some("RESOURCE_EXHAUSTED")
        || m.contains("rate limit")
        || m.contains("quota")
}

/// User-facing message for an upstream error.
pub fn rewrite_error(status: u16, err: &UpstreamError, model: Option<&str>) -> String {
    if is_preview_denial(status, err) {
        let subject = model
            .map(|m| format!("Model `{}`", m))
            .unwrap_or_else(|| "This model".to_string());
        return format!(
            "{} is in preview and this account has no access to it. \
             Enable preview models for the Code Assist project or pick another model. ({})",
            subject, err.message
        );
    }
    if is_rate_limit(status, err) {
        let mut msg = "Rate limit reached for this account".to_string();
        if let Some(hint) = retry_hint(err) {
            msg.push_str(&format!("; retry in {}", hint));
        }
        msg.push_str(&format!(". ({})", err.message));
        return msg;
    }
    err.message.clone()
}

pub fn rewrite_error_body(status: u16, body: &str, model: Option<&str>) -> String {
    rewrite_error(status, &extract_error(body), model)
}
