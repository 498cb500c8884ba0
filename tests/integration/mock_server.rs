//! Mock HTTP server setup for integration tests

use ai_lib_bridge::cache::SharedCaches;
use ai_lib_bridge::{BridgeConfig, ProviderClient};
use mockito::{Matcher, Mock, Server, ServerGuard};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }

    /// Base URL of a named fallback endpoint on this server.
    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// Client with the given endpoints, a static token and private caches.
    pub fn client(&self, endpoints: &[String]) -> ProviderClient {
        client_for(BridgeConfig::default().with_endpoints(endpoints.iter().cloned()))
    }

    /// Mock a streaming generate call under `/name/...`.
    pub async fn mock_sse_stream(&mut self, name: &str, frames: &[&str]) -> Mock {
        let body = frames
            .iter()
            .map(|frame| format!("data: {}\n\n", frame))
            .collect::<String>();
        self.server
            .mock("POST", Matcher::Regex(format!(r"^/{}/v1internal:streamGenerateContent", name)))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_header("x-request-id", "upstream-abc")
            .with_body(body)
            .create_async()
            .await
    }

    /// Mock a non-streaming generate call under `/name/...`.
    pub async fn mock_generate(&mut self, name: &str, status: usize, body: &str) -> Mock {
        self.server
            .mock("POST", Matcher::Regex(format!(r"^/{}/v1internal:generateContent", name)))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }
}

pub fn client_for(config: BridgeConfig) -> ProviderClient {
    ProviderClient::builder(config)
        .with_static_token("ya29.test-token")
        .with_caches(SharedCaches::isolated())
        .with_session_id("session-it")
        .build()
        .unwrap()
}

/// Raw server that sends response headers and `frames`, then keeps the
/// connection open without sending anything else.
pub async fn stalling_sse_server(frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let frames = frames.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 64 * 1024];
                let _ = socket.read(&mut buf).await;
                let mut response = String::from(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                     connection: close\r\n\r\n",
                );
                for frame in &frames {
                    response.push_str(&format!("data: {}\n\n", frame));
                }
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    format!("http://{}", addr)
}

pub fn gemini_text_frame(text: &str) -> String {
    serde_json::json!({
        "response": {
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        }
    })
    .to_string()
}
