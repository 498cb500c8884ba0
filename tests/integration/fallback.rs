//! Endpoint fallback behaviour of the orchestrator.

use crate::mock_server::MockServerFixture;
use ai_lib_bridge::{ChatRequest, Error, Message};

const OK_BODY: &str = r#"{"response":{"candidates":[{"content":{"role":"model","parts":[{"text":"pong"}]},"finishReason":"STOP"}],
    "usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":1,"totalTokenCount":4}}}"#;

const RATE_LIMITED: &str = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","message":"Quota exceeded",
    "details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"12s"}]}}"#;

#[tokio::test]
async fn third_endpoint_answers_after_two_failures() {
    let mut fixture = MockServerFixture::new().await;
    let unavailable = r#"{"error":{"code":503,"message":"unavailable"}}"#;
    let first = fixture.mock_generate("a", 503, unavailable).await;
    let second = fixture.mock_generate("b", 429, RATE_LIMITED).await;
    let third = fixture.mock_generate("c", 200, OK_BODY).await;

    let endpoints = vec![fixture.endpoint("a"), fixture.endpoint("b"), fixture.endpoint("c")];
    let client = fixture.client(&endpoints);
    let (response, stats) = client
        .chat(ChatRequest::new("gemini-2.5-flash", vec![Message::user("ping")]))
        .await
        .unwrap();

    assert_eq!(response.text(), "pong");
    assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
    assert_eq!(stats.endpoint, endpoints[2]);
    assert_eq!(stats.http_status, 200);
    assert_eq!(stats.failed_attempts(), 2);
    assert_eq!(stats.attempts[0].status, Some(503));
    assert_eq!(stats.attempts[1].status, Some(429));
    assert!(stats.attempts[1].message.contains("retry in 12s"));

    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
}

#[tokio::test]
async fn first_success_stops_the_loop() {
    let mut fixture = MockServerFixture::new().await;
    let first = fixture.mock_generate("a", 200, OK_BODY).await;
    let second = fixture
        .server
        .mock("POST", "/b/v1internal:generateContent")
        .with_status(200)
        .with_body(OK_BODY)
        .expect(0)
        .create_async()
        .await;

    let client = fixture.client(&[fixture.endpoint("a"), fixture.endpoint("b")]);
    let (_, stats) = client
        .chat(ChatRequest::new("gemini-2.5-pro", vec![Message::user("ping")]))
        .await
        .unwrap();

    assert!(stats.attempts.is_empty());
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn all_endpoints_failing_surfaces_rewritten_error() {
    let mut fixture = MockServerFixture::new().await;
    for name in ["a", "b", "c"] {
        fixture.mock_generate(name, 429, RATE_LIMITED).await;
    }

    let endpoints = [fixture.endpoint("a"), fixture.endpoint("b"), fixture.endpoint("c")];
    let client = fixture.client(&endpoints);
    let err = client
        .chat(ChatRequest::new("gemini-2.5-flash", vec![Message::user("ping")]))
        .await
        .err()
        .unwrap();

    match err {
        Error::Remote {
            status,
            message,
            endpoint,
            attempts,
        } => {
            assert_eq!(status, 429);
            assert_eq!(attempts, 3);
            assert!(endpoint.ends_with("/c"));
            assert!(message.starts_with("Rate limit reached"));
            assert!(message.contains("retry in 12s"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_falls_through_to_next() {
    let mut fixture = MockServerFixture::new().await;
    let ok = fixture.mock_generate("b", 200, OK_BODY).await;

    // Port 9 (discard) on loopback: connection refused.
    let dead = "http://127.0.0.1:9".to_string();
    let client = fixture.client(&[dead.clone(), fixture.endpoint("b")]);
    let (response, stats) = client
        .chat(ChatRequest::new("gemini-2.5-flash", vec![Message::user("ping")]))
        .await
        .unwrap();

    assert_eq!(response.text(), "pong");
    assert_eq!(stats.attempts.len(), 1);
    assert_eq!(stats.attempts[0].endpoint, dead);
    assert_eq!(stats.attempts[0].status, None);
    ok.assert_async().await;
}

#[tokio::test]
async fn request_carries_envelope_and_identity_headers() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/a/v1internal:generateContent")
        .match_header("authorization", "Bearer ya29.test-token")
        .match_header("client-metadata", mockito::Matcher::Any)
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "model": "gemini-2.5-flash",
            "userAgent": "antigravity",
            "requestType": "agent",
        })))
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    let client = fixture.client(&[fixture.endpoint("a")]);
    client
        .chat(ChatRequest::new("gemini-2.5-flash", vec![Message::user("ping")]))
        .await
        .unwrap();
    mock.assert_async().await;
}
