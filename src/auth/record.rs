//! OAuth token record and account metadata.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Provider API key issued after login (iFlow).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl AccountInfo {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.tier.is_none()
            && self.project_id.is_none()
            && self.api_key.is_none()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Absolute expiry in Unix milliseconds. Absent means "never expires".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "AccountInfo::is_empty")]
    pub account: AccountInfo,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenRecord {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at_ms: None,
            account: AccountInfo::default(),
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_expires_at_ms(mut self, at: u64) -> Self {
        self.expires_at_ms = Some(at);
        self
    }

    /// Expiry computed as `now + expires_in_secs`.
    pub fn with_expires_in(mut self, expires_in_secs: u64) -> Self {
        self.expires_at_ms = Some(now_ms().saturating_add(expires_in_secs.saturating_mul(1000)));
        self
    }

    pub fn with_account(mut self, account: AccountInfo) -> Self {
        self.account = account;
        self
    }

    /// `true` when an expiry exists and `now + buffer_ms >= expiry`.
    pub fn is_expired_at(&self, now_ms: u64, buffer_ms: u64) -> bool {
        match self.expires_at_ms {
            Some(expiry) => now_ms.saturating_add(buffer_ms) >= expiry,
            None => false,
        }
    }

    pub fn is_expired(&self, buffer_ms: u64) -> bool {
        self.is_expired_at(now_ms(), buffer_ms)
    }
}

// Token values stay out of debug output.
impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_at_ms", &self.expires_at_ms)
            .field("account", &self.account)
            .finish()
    }
}

/// Externally observable credential state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    NotAuthorized,
    Valid,
    Expired,
    Revoked,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_expiry_is_expired_future_is_not() {
        let now = now_ms();
        let past = TokenRecord::new("a").with_expires_at_ms(now - 1000);
        assert!(past.is_expired_at(now, 0));
        let future = TokenRecord::new("a").with_expires_at_ms(now + 1_000_000);
        assert!(!future.is_expired_at(now, 0));
    }

    #[test]
    fn buffer_moves_the_expiry_boundary() {
        let rec = TokenRecord::new("a").with_expires_at_ms(10_000);
        assert!(!rec.is_expired_at(5_000, 4_999));
        assert!(rec.is_expired_at(5_000, 5_000));
    }

    #[test]
    fn missing_expiry_never_expires() {
        assert!(!TokenRecord::new("a").is_expired_at(u64::MAX, u64::MAX));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rec = TokenRecord::new("ya29.secret").with_refresh_token("1//refresh");
        let dbg = format!("{:?}", rec);
        assert!(!dbg.contains("ya29.secret"));
        assert!(!dbg.contains("1//refresh"));
    }

    #[test]
    fn serde_round_trip_keeps_account() {
        let rec = TokenRecord::new("a").with_account(AccountInfo {
            email: Some("user@example.com".into()),
            ..Default::default()
        });
        let json = serde_json::to_string(&rec).unwrap();
        let back: TokenRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
        let bare: TokenRecord = serde_json::from_str(r#"{"access_token":"x"}"#).unwrap();
        assert_eq!(bare.token_type, "Bearer");
    }
}
