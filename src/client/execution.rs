//! 请求执行逻辑：按顺序尝试回退端点，流式与非流式执行。
//!
//! Endpoint fallback and call execution.
//!
//! Attempts are strictly sequential. The first 2xx wins; every failure before it is
//! recorded as an [`AttemptRecord`]. There is no backoff retry: when every endpoint
//! fails, the call fails with the last error.

use crate::adapter::{rewrite_error_body, ResponseAdapter};
use crate::client::core::{PreparedCall, ProviderClient};
use crate::client::stream::ChatStream;
use crate::client::types::{AttemptRecord, CallStats, CancelHandle};
use crate::pipeline::decode_sse;
use crate::transport::{byte_stream, read_body};
use crate::types::{CanonicalResponse, ChatRequest};
use crate::{Error, Result};
use reqwest::header::HeaderMap;
use reqwest::Response;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const UPSTREAM_ID_HEADERS: &[&str] = &[
    "x-request-id",
    "x-cloudaicompanion-trace-id",
    "request-id",
    "x-goog-request-id",
];

fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}

/// Successful attempt.
pub(crate) struct Connected {
    pub response: Response,
    pub endpoint: String,
    pub attempts: Vec<AttemptRecord>,
}

impl ProviderClient {
    pub(crate) async fn send_with_fallback(
        &self,
        call: &PreparedCall,
        stream: bool,
        cancel: &CancellationToken,
    ) -> Result<Connected> {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<Error> = None;

        for endpoint in &call.endpoints {
            let url = format!(
                "{}{}",
                endpoint.trim_end_matches('/'),
                self.driver.request_path(stream)
            );
            let headers = self.build_headers(call, endpoint)?;
            let start = Instant::now();
            debug!(url = %url, request_id = %call.request_id, stream, "attempting endpoint");

            let response = match self
                .transport
                .post_body(&url, headers, call.body.clone(), stream, cancel)
                .await
            {
                Ok(response) => response,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    info!(
                        endpoint = endpoint.as_str(),
                        error = %e,
                        duration_ms = start.elapsed().as_millis(),
                        "endpoint attempt failed"
                    );
                    attempts.push(AttemptRecord {
                        endpoint: endpoint.clone(),
                        status: None,
                        message: e.to_string(),
                    });
                    last_error = Some(e);
                    continue;
                }
            };

            let status = response.status().as_u16();
            if response.status().is_success() {
                if stream && response.content_length() == Some(0) {
                    info!(
                        http_status = status,
                        endpoint = endpoint.as_str(),
                        "streaming response had no body"
                    );
                    let message = "streaming response had no body".to_string();
                    attempts.push(AttemptRecord {
                        endpoint: endpoint.clone(),
                        status: Some(status),
                        message: message.clone(),
                    });
                    last_error = Some(Error::Remote {
                        status,
                        message,
                        endpoint: endpoint.clone(),
                        attempts: 0,
                    });
                    continue;
                }
                return Ok(Connected {
                    response,
                    endpoint: endpoint.clone(),
                    attempts,
                });
            }

            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                body = read_body(response) => body.map(|(_, b)| b).unwrap_or_default(),
            };
            let message = rewrite_error_body(status, &body, Some(&call.model));
            info!(
                http_status = status,
                endpoint = endpoint.as_str(),
                duration_ms = start.elapsed().as_millis(),
                "endpoint attempt failed"
            );
            attempts.push(AttemptRecord {
                endpoint: endpoint.clone(),
                status: Some(status),
                message: message.clone(),
            });
            last_error = Some(Error::Remote {
                status,
                message,
                endpoint: endpoint.clone(),
                attempts: 0,
            });
        }

        let tried = attempts.len();
        Err(match last_error {
            Some(Error::Remote {
                status,
                message,
                endpoint,
                ..
            }) => Error::Remote {
                status,
                message,
                endpoint,
                attempts: tried,
            },
            Some(other) => other,
            None => Error::validation_with_context(
                "no endpoints to try",
                crate::ErrorContext::new().with_field_path("endpoints"),
            ),
        })
    }

    fn stats(&self, call: &PreparedCall, connected: &Connected, start: Instant) -> CallStats {
        CallStats {
            request_id: call.request_id.clone(),
            session_id: self.session_id.clone(),
            model: call.model.clone(),
            family: call.family,
            endpoint: connected.endpoint.clone(),
            http_status: connected.response.status().as_u16(),
            attempts: connected.attempts.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
            upstream_request_id: header_first(connected.response.headers(), UPSTREAM_ID_HEADERS),
        }
    }

    fn adapter(&self, call: &PreparedCall, endpoint: &str) -> ResponseAdapter {
        ResponseAdapter::new(call.family, self.session_id.clone(), self.caches.clone())
            .with_model(call.model.clone())
            .with_endpoint(endpoint)
    }

    /// Non-streaming call.
    pub async fn chat(&self, request: ChatRequest) -> Result<(CanonicalResponse, CallStats)> {
        self.chat_with_cancel(request, &CancellationToken::new()).await
    }

    pub async fn chat_with_cancel(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<(CanonicalResponse, CallStats)> {
        let start = Instant::now();
        let call = self.prepare(&request, false, cancel).await?;
        let connected = self.send_with_fallback(&call, false, cancel).await?;
        let mut stats = self.stats(&call, &connected, start);

        let (_, body) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            body = read_body(connected.response) => body?,
        };
        let response = self.adapter(&call, &connected.endpoint).adapt_batch(&body)?;
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            http_status = stats.http_status,
            endpoint = stats.endpoint.as_str(),
            wire_format = call.debug_info.wire_format,
            failed_attempts = stats.attempts.len(),
            duration_ms = stats.duration_ms,
            "chat call completed"
        );
        Ok((response, stats))
    }

    /// Streaming call. The returned handle cancels the stream.
    pub async fn chat_stream(&self, request: ChatRequest) -> Result<(ChatStream, CancelHandle)> {
        let cancel = CancellationToken::new();
        let stream = self.chat_stream_with_cancel(request, cancel.clone()).await?;
        Ok((stream, CancelHandle::new(cancel)))
    }

    /// Streaming call bound to a caller-owned token, so the connect phase can be
    /// cancelled as well.
    pub async fn chat_stream_with_cancel(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream> {
        let start = Instant::now();
        let call = self.prepare(&request, true, &cancel).await?;
        let connected = self.send_with_fallback(&call, true, &cancel).await?;
        let stats = self.stats(&call, &connected, start);
        info!(
            http_status = stats.http_status,
            endpoint = stats.endpoint.as_str(),
            wire_format = call.debug_info.wire_format,
            failed_attempts = stats.attempts.len(),
            duration_ms = stats.duration_ms,
            "streaming call connected"
        );

        let adapter = self.adapter(&call, &connected.endpoint);
        let frames = decode_sse(byte_stream(connected.response), cancel.clone());
        Ok(ChatStream::new(
            frames,
            adapter,
            self.config.timeouts.idle(),
            cancel,
            stats,
        ))
    }
}
