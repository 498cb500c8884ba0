//! Integration tests for streaming responses

use crate::mock_server::{client_for, gemini_text_frame, stalling_sse_server, MockServerFixture};
use ai_lib_bridge::{BridgeConfig, ChatRequest, Error, Message};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn sse_stream_yields_chunks_and_final_usage() {
    let mut fixture = MockServerFixture::new().await;
    let final_frame = serde_json::json!({
        "response": {
            "candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "STOP"}],
            "usageMetadata": {
                "promptTokenCount": 5, "candidatesTokenCount": 2, "totalTokenCount": 7
            }
        }
    })
    .to_string();
    let hello = gemini_text_frame("Hello");
    let world = gemini_text_frame(" world");
    let mock = fixture
        .mock_sse_stream("a", &[hello.as_str(), world.as_str(), final_frame.as_str(), "[DONE]"])
        .await;

    let client = fixture.client(&[fixture.endpoint("a")]);
    let (mut stream, _cancel) = client
        .chat_stream(ChatRequest::new("gemini-2.5-flash", vec![Message::user("hi")]))
        .await
        .unwrap();

    let mut text = String::new();
    let mut chunks = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        assert!(!chunk.is_empty());
        text.push_str(&chunk.text());
        chunks += 1;
    }

    assert_eq!(chunks, 2);
    assert_eq!(text, "Hello world");
    let summary = stream.summary();
    assert_eq!(summary.finish_reason.as_deref(), Some("STOP"));
    let usage = summary.usage.unwrap();
    assert_eq!(usage.prompt_tokens, Some(5));
    assert_eq!(usage.total_tokens, Some(7));
    assert_eq!(stream.stats().upstream_request_id.as_deref(), Some("upstream-abc"));
    mock.assert_async().await;
}

#[tokio::test]
async fn stream_falls_back_past_failing_endpoint() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", mockito::Matcher::Regex(r"^/a/v1internal:streamGenerateContent".into()))
        .with_status(500)
        .with_body(r#"{"error":{"code":500,"message":"backend error"}}"#)
        .create_async()
        .await;
    let frame = gemini_text_frame("ok");
    fixture.mock_sse_stream("b", &[frame.as_str()]).await;

    let client = fixture.client(&[fixture.endpoint("a"), fixture.endpoint("b")]);
    let (stream, _cancel) = client
        .chat_stream(ChatRequest::new("gemini-2.5-pro", vec![Message::user("hi")]))
        .await
        .unwrap();
    assert_eq!(stream.stats().attempts.len(), 1);
    assert_eq!(stream.stats().attempts[0].message, "backend error");
    let response = stream.collect_response().await.unwrap();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn in_band_error_frame_ends_the_stream() {
    let mut fixture = MockServerFixture::new().await;
    let first = gemini_text_frame("partial");
    let error = r#"{"error":{"code":429,"message":"Quota exceeded. Your quota will reset after 30s."}}"#;
    fixture.mock_sse_stream("a", &[first.as_str(), error]).await;

    let client = fixture.client(&[fixture.endpoint("a")]);
    let (mut stream, _cancel) = client
        .chat_stream(ChatRequest::new("gemini-2.5-flash", vec![Message::user("hi")]))
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().text(), "partial");
    match stream.next().await {
        Some(Err(Error::Remote { status, message, .. })) => {
            assert_eq!(status, 429);
            assert!(message.contains("retry in 30s"));
        }
        other => panic!("unexpected item: {other:?}"),
    }
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn cancel_handle_ends_stream_with_cancelled() {
    let base = stalling_sse_server(vec![gemini_text_frame("first")]).await;
    let client = client_for(BridgeConfig::default().with_endpoints([base]));
    let (mut stream, cancel) = client
        .chat_stream(ChatRequest::new("gemini-2.5-flash", vec![Message::user("hi")]))
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().text(), "first");
    cancel.cancel();
    let started = Instant::now();
    assert!(matches!(stream.next().await, Some(Err(Error::Cancelled))));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn stalled_upstream_hits_idle_timeout() {
    let base = stalling_sse_server(vec![gemini_text_frame("first")]).await;
    let config = BridgeConfig::default()
        .with_endpoints([base])
        .with_idle_timeout(Duration::from_secs(1));
    let client = client_for(config);
    let (mut stream, _cancel) = client
        .chat_stream(ChatRequest::new("gemini-2.5-flash", vec![Message::user("hi")]))
        .await
        .unwrap();

    assert!(stream.next().await.unwrap().is_ok());
    let started = Instant::now();
    match stream.next().await {
        Some(Err(Error::IdleTimeout { idle_ms })) => assert_eq!(idle_ms, 1000),
        other => panic!("unexpected item: {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn pre_cancelled_token_aborts_before_connecting() {
    let fixture = MockServerFixture::new().await;
    let client = fixture.client(&[fixture.endpoint("a")]);
    let token = CancellationToken::new();
    token.cancel();
    let request = ChatRequest::new("gemini-2.5-flash", vec![Message::user("hi")]);
    let err = client
        .chat_stream_with_cancel(request, token)
        .await
        .err()
        .unwrap();
    assert!(err.is_cancelled());
}
