//! Interactive authorization: opener, loopback callback and code exchange.

use crate::mock_server::MockServerFixture;
use ai_lib_bridge::auth::{
    now_ms, AuthorizationOpener, MemorySecretStore, SecretRef, SecretStore, TokenManager,
    TokenRecord, TokenStatus,
};
use ai_lib_bridge::config::{OAuthConfig, TimeoutConfig, TransportConfig};
use ai_lib_bridge::transport::HttpTransport;
use ai_lib_bridge::{AuthError, Error};
use async_trait::async_trait;
use mockito::Matcher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Plays the browser: follows the redirect back to the loopback listener.
struct RedirectingOpener {
    override_state: Option<&'static str>,
    seen_url: Mutex<Option<String>>,
}

impl RedirectingOpener {
    fn new(override_state: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            override_state,
            seen_url: Mutex::new(None),
        })
    }
}

#[async_trait]
impl AuthorizationOpener for RedirectingOpener {
    async fn open(&self, url: &str) -> ai_lib_bridge::Result<()> {
        *self.seen_url.lock().unwrap() = Some(url.to_string());
        let parsed = url::Url::parse(url).unwrap();
        let param = |name: &str| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };
        let redirect = param("redirect_uri").replace("localhost", "127.0.0.1");
        let state = self.override_state.map(String::from).unwrap_or_else(|| param("state"));
        let callback = format!("{}?code=code-from-browser&state={}", redirect, state);
        tokio::spawn(async move {
            let _ = reqwest::get(callback).await;
        });
        Ok(())
    }
}

fn oauth(base: &str) -> OAuthConfig {
    let mut oauth = OAuthConfig::google("client-abc", "secret-xyz");
    oauth.token_url = format!("{}/token", base);
    oauth.user_info_url = None;
    oauth.callback_port = 0;
    oauth
}

fn manager(fixture: &MockServerFixture, opener: Arc<RedirectingOpener>) -> TokenManager {
    let http = HttpTransport::new(&TransportConfig::default(), &TimeoutConfig::default()).unwrap();
    TokenManager::new(
        oauth(&fixture.base_url),
        http,
        Arc::new(MemorySecretStore::new()),
        SecretRef::new("oauth-interactive"),
    )
    .with_discovery_endpoints(Vec::<String>::new())
    .with_project_hint("proj-hint")
    .with_opener(opener)
    .with_callback_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn authorize_round_trips_through_loopback_callback() {
    let mut fixture = MockServerFixture::new().await;
    let token = fixture
        .server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "code-from-browser".into()),
            Matcher::Regex("code_verifier=".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"at-int","refresh_token":"rt-int","expires_in":3599}"#)
        .create_async()
        .await;

    let opener = RedirectingOpener::new(None);
    let manager = manager(&fixture, opener.clone());
    let record = manager.authorize().await.unwrap();

    assert_eq!(record.access_token, "at-int");
    assert_eq!(record.account.project_id.as_deref(), Some("proj-hint"));
    assert_eq!(manager.status(), TokenStatus::Valid);

    let url = opener.seen_url.lock().unwrap().clone().unwrap();
    assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(url.contains("access_type=offline"));
    assert!(url.contains("code_challenge_method=S256"));
    token.assert_async().await;
}

#[tokio::test]
async fn forged_state_is_rejected() {
    let fixture = MockServerFixture::new().await;
    let manager = manager(&fixture, RedirectingOpener::new(Some("forged")));
    let err = manager.authorize().await.err().unwrap();
    assert!(matches!(err, Error::Auth(AuthError::StateMismatch)));
    assert_eq!(manager.status(), TokenStatus::Error);
}

struct SilentOpener;

#[async_trait]
impl AuthorizationOpener for SilentOpener {
    async fn open(&self, _url: &str) -> ai_lib_bridge::Result<()> {
        Ok(())
    }
}

/// Ignores the first URL (an abandoned sign-in), then redirects like a browser.
struct AbandonOnceOpener {
    opened: AtomicUsize,
    browser: Arc<RedirectingOpener>,
}

#[async_trait]
impl AuthorizationOpener for AbandonOnceOpener {
    async fn open(&self, url: &str) -> ai_lib_bridge::Result<()> {
        if self.opened.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(());
        }
        self.browser.open(url).await
    }
}

#[tokio::test]
async fn cancel_pending_aborts_the_wait() {
    let fixture = MockServerFixture::new().await;
    let http = HttpTransport::new(&TransportConfig::default(), &TimeoutConfig::default()).unwrap();
    let manager = Arc::new(
        TokenManager::new(
            oauth(&fixture.base_url),
            http,
            Arc::new(MemorySecretStore::new()),
            SecretRef::new("oauth-cancel"),
        )
        .with_opener(Arc::new(SilentOpener))
        .with_callback_timeout(Duration::from_secs(30)),
    );

    let waiting = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.authorize().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.cancel_pending();
    let result = tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn manager_recovers_after_cancelled_authorization() {
    let mut fixture = MockServerFixture::new().await;
    let refresh = fixture
        .server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
        .with_status(200)
        .with_body(r#"{"access_token":"at-after-cancel","expires_in":3599}"#)
        .expect(1)
        .create_async()
        .await;
    let exchange = fixture
        .server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()))
        .with_status(200)
        .with_body(r#"{"access_token":"at-second","refresh_token":"rt-second","expires_in":3599}"#)
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemorySecretStore::new());
    let secret_ref = SecretRef::new("oauth-recover");
    let stale = TokenRecord::new("at-stale")
        .with_refresh_token("rt")
        .with_expires_at_ms(now_ms().saturating_sub(1_000));
    store.set_token(&secret_ref, &stale).await.unwrap();

    let http = HttpTransport::new(&TransportConfig::default(), &TimeoutConfig::default()).unwrap();
    let manager = Arc::new(
        TokenManager::new(oauth(&fixture.base_url), http, store, secret_ref)
            .with_discovery_endpoints(Vec::<String>::new())
            .with_opener(Arc::new(AbandonOnceOpener {
                opened: AtomicUsize::new(0),
                browser: RedirectingOpener::new(None),
            }))
            .with_callback_timeout(Duration::from_secs(30)),
    );

    let waiting = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.authorize().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.cancel_pending();
    let first = tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, Err(Error::Cancelled)));

    let fresh = manager.get_credential().await.unwrap();
    assert_eq!(fresh.access_token, "at-after-cancel");
    assert_eq!(fresh.refresh_token.as_deref(), Some("rt"));
    assert_eq!(manager.status(), TokenStatus::Valid);
    refresh.assert_async().await;

    // A new interactive flow on the same manager is not born cancelled.
    let second = manager.authorize().await.unwrap();
    assert_eq!(second.access_token, "at-second");
    exchange.assert_async().await;
}
