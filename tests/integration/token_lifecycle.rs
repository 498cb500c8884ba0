//! Token exchange, refresh, expiry and revocation against a mock OAuth server.

use crate::mock_server::MockServerFixture;
use ai_lib_bridge::auth::{
    now_ms, MemorySecretStore, SecretRef, SecretStore, TokenManager, TokenRecord, TokenStatus,
};
use ai_lib_bridge::config::{OAuthConfig, TimeoutConfig, TransportConfig};
use ai_lib_bridge::transport::HttpTransport;
use ai_lib_bridge::{ChatRequest, Error, Message, ProviderClient};
use mockito::Matcher;
use std::sync::Arc;

fn google_config(base: &str) -> OAuthConfig {
    let mut oauth = OAuthConfig::google("client-abc", "secret-xyz");
    oauth.token_url = format!("{}/token", base);
    oauth.revoke_url = Some(format!("{}/revoke", base));
    oauth.user_info_url = Some(format!("{}/userinfo", base));
    oauth
}

fn manager(
    fixture: &MockServerFixture,
    store: Arc<MemorySecretStore>,
    secret_ref: SecretRef,
) -> TokenManager {
    let http = HttpTransport::new(&TransportConfig::default(), &TimeoutConfig::default()).unwrap();
    TokenManager::new(google_config(&fixture.base_url), http, store, secret_ref)
        .with_discovery_endpoints([fixture.base_url.clone()])
}

fn expired_record(refresh: &str) -> TokenRecord {
    TokenRecord::new("at-stale")
        .with_refresh_token(refresh)
        .with_expires_at_ms(now_ms().saturating_sub(1_000))
}

#[tokio::test]
async fn exchange_persists_record_with_account() {
    let mut fixture = MockServerFixture::new().await;
    let token = fixture
        .server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "code-123".into()),
            Matcher::UrlEncoded("client_id".into(), "client-abc".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":3600,"token_type":"Bearer"}"#,
        )
        .create_async()
        .await;
    fixture
        .server
        .mock("GET", "/userinfo")
        .match_header("authorization", "Bearer at-1")
        .with_status(200)
        .with_body(r#"{"email":"dev@example.com"}"#)
        .create_async()
        .await;
    fixture
        .server
        .mock("POST", "/v1internal:loadCodeAssist")
        .with_status(200)
        .with_body(r#"{"cloudaicompanionProject":"proj-77","currentTier":{"id":"free-tier"}}"#)
        .create_async()
        .await;

    let store = Arc::new(MemorySecretStore::new());
    let secret_ref = SecretRef::new("oauth-test");
    let manager = manager(&fixture, store.clone(), secret_ref.clone());
    let mut events = manager.subscribe();

    let record = manager
        .exchange("code-123", "http://localhost:51121/oauth-callback")
        .await
        .unwrap();
    assert_eq!(record.access_token, "at-1");
    assert_eq!(record.refresh_token.as_deref(), Some("rt-1"));
    assert!(record.expires_at_ms.unwrap() > now_ms());
    assert_eq!(record.account.email.as_deref(), Some("dev@example.com"));
    assert_eq!(record.account.project_id.as_deref(), Some("proj-77"));
    assert_eq!(record.account.tier.as_deref(), Some("free-tier"));

    assert_eq!(store.get_token(&secret_ref).await.unwrap(), Some(record));
    assert_eq!(manager.status(), TokenStatus::Valid);
    assert_eq!(events.recv().await.unwrap(), TokenStatus::Valid);
    token.assert_async().await;
}

#[tokio::test]
async fn refresh_keeps_prior_refresh_token_and_account() {
    let mut fixture = MockServerFixture::new().await;
    let refresh = fixture
        .server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "rt-old".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"at-2","expires_in":"3600"}"#)
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemorySecretStore::new());
    let secret_ref = SecretRef::new("oauth-refresh");
    let mut stale = expired_record("rt-old");
    stale.account.project_id = Some("proj-kept".into());
    store.set_token(&secret_ref, &stale).await.unwrap();

    let manager = manager(&fixture, store.clone(), secret_ref.clone());
    let record = manager.get_credential().await.unwrap();
    assert_eq!(record.access_token, "at-2");
    assert_eq!(record.refresh_token.as_deref(), Some("rt-old"));
    assert_eq!(record.account.project_id.as_deref(), Some("proj-kept"));
    assert_eq!(manager.status(), TokenStatus::Valid);

    // Fresh token: no second refresh.
    let again = manager.get_credential().await.unwrap();
    assert_eq!(again.access_token, "at-2");
    refresh.assert_async().await;

    let stored = store.get_token(&secret_ref).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "at-2");
}

#[tokio::test]
async fn failed_refresh_requires_reauthorization() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        )
        .create_async()
        .await;

    let store = Arc::new(MemorySecretStore::new());
    let secret_ref = SecretRef::new("oauth-dead");
    store.set_token(&secret_ref, &expired_record("rt-dead")).await.unwrap();

    let manager = manager(&fixture, store, secret_ref);
    let mut events = manager.subscribe();
    let err = manager.get_credential().await.err().unwrap();
    assert!(err.requires_reauthorization());
    assert!(err.to_string().contains("invalid_grant"));
    assert_eq!(manager.status(), TokenStatus::Expired);

    let mut seen = Vec::new();
    while let Ok(status) = events.try_recv() {
        seen.push(status);
    }
    assert_eq!(seen.last(), Some(&TokenStatus::Expired));
}

#[tokio::test]
async fn missing_credential_requires_reauthorization() {
    let fixture = MockServerFixture::new().await;
    let store = Arc::new(MemorySecretStore::new());
    let manager = manager(&fixture, store, SecretRef::new("oauth-none"));
    let err = manager.get_credential().await.err().unwrap();
    assert!(matches!(err, Error::ReauthorizationRequired { .. }));
    assert_eq!(manager.status(), TokenStatus::NotAuthorized);
}

#[tokio::test]
async fn revoke_calls_upstream_and_forgets_record() {
    let mut fixture = MockServerFixture::new().await;
    let revoke = fixture
        .server
        .mock("POST", "/revoke")
        .match_body(Matcher::UrlEncoded("token".into(), "rt-live".into()))
        .with_status(200)
        .create_async()
        .await;

    let store = Arc::new(MemorySecretStore::new());
    let secret_ref = SecretRef::new("oauth-revoke");
    let live = TokenRecord::new("at-live").with_refresh_token("rt-live").with_expires_in(3600);
    store.set_token(&secret_ref, &live).await.unwrap();

    let manager = manager(&fixture, store.clone(), secret_ref.clone());
    manager.revoke().await.unwrap();
    assert!(store.is_empty());
    assert_eq!(manager.status(), TokenStatus::Revoked);
    assert!(manager.get_credential().await.err().unwrap().requires_reauthorization());
    revoke.assert_async().await;
}

#[tokio::test]
async fn revoke_succeeds_locally_when_upstream_rejects() {
    let mut fixture = MockServerFixture::new().await;
    fixture.server.mock("POST", "/revoke").with_status(500).create_async().await;

    let store = Arc::new(MemorySecretStore::new());
    let secret_ref = SecretRef::new("oauth-revoke-500");
    store.set_token(&secret_ref, &TokenRecord::new("at")).await.unwrap();

    let manager = manager(&fixture, store.clone(), secret_ref);
    manager.revoke().await.unwrap();
    assert!(store.is_empty());
    assert_eq!(manager.status(), TokenStatus::Revoked);
}

#[tokio::test]
async fn client_uses_refreshed_token_and_discovered_project() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token":"at-fresh","expires_in":3600}"#)
        .create_async()
        .await;
    let generate = fixture
        .server
        .mock("POST", "/gw/v1internal:generateContent")
        .match_header("authorization", "Bearer at-fresh")
        .match_body(Matcher::PartialJson(serde_json::json!({"project": "proj-acct"})))
        .with_status(200)
        .with_body(r#"{"response":{"candidates":[{"content":{"parts":[{"text":"done"}]}}]}}"#)
        .create_async()
        .await;

    let store = Arc::new(MemorySecretStore::new());
    let secret_ref = SecretRef::new("oauth-client");
    let mut stale = expired_record("rt-1");
    stale.account.project_id = Some("proj-acct".into());
    store.set_token(&secret_ref, &stale).await.unwrap();
    let manager = Arc::new(manager(&fixture, store, secret_ref));

    let config = ai_lib_bridge::BridgeConfig::default().with_endpoints([fixture.endpoint("gw")]);
    let client = ProviderClient::builder(config)
        .with_token_manager(manager.clone())
        .with_caches(ai_lib_bridge::cache::SharedCaches::isolated())
        .build()
        .unwrap();
    let (response, _) = client
        .chat(ChatRequest::new("gemini-2.5-flash", vec![Message::user("go")]))
        .await
        .unwrap();
    assert_eq!(response.text(), "done");
    generate.assert_async().await;
}
