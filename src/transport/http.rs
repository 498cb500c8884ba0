use crate::config::{TimeoutConfig, TransportConfig};
use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Proxy, RequestBuilder, Response};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Shared HTTP client for gateway, token and metadata calls.
///
/// The client carries no global timeout: a streaming response may legitimately stay
/// open for minutes. Non-streaming calls get the per-request timeout instead, and
/// streaming calls are bounded by the idle timeout of the pipeline.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(transport: &TransportConfig, timeouts: &TimeoutConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(timeouts.connect())
            .pool_max_idle_per_host(transport.pool_max_idle_per_host)
            .pool_idle_timeout(Some(Duration::from_secs(transport.pool_idle_timeout_secs)))
            // Conservative HTTP/2 keepalive defaults for long-lived streams.
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &transport.proxy_url {
            match Proxy::all(proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy url"),
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            request_timeout: timeouts.request(),
        })
    }

    /// Wrap an existing client, e.g. one with custom TLS roots.
    pub fn from_client(client: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST a pre-serialized JSON body. `stream` selects the SSE accept header and
    /// skips the per-request timeout.
    pub async fn post_body(
        &self,
        url: &str,
        headers: HeaderMap,
        body: String,
        stream: bool,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let mut req = self
            .client
            .post(url)
            .headers(headers)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if stream {
            req = req.header(reqwest::header::ACCEPT, "text/event-stream");
        } else {
            req = req
                .header(reqwest::header::ACCEPT, "application/json")
                .timeout(self.request_timeout);
        }
        self.send(req, cancel).await
    }

    /// POST an `application/x-www-form-urlencoded` body, optionally with HTTP Basic
    /// client authentication.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        basic_auth: Option<(&str, &str)>,
        cancel: &CancellationToken,
    ) -> Result<(u16, String)> {
        let mut req = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .timeout(self.request_timeout);
        if let Some((user, pass)) = basic_auth {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = self.send(req, cancel).await?;
        read_body(resp).await
    }

    /// POST a JSON value with a bearer token; returns status and body text.
    pub async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(u16, String)> {
        let req = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .timeout(self.request_timeout);
        let resp = self.send(req, cancel).await?;
        read_body(resp).await
    }

    pub async fn get(
        &self,
        url: &str,
        headers: HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<(u16, String)> {
        let req = self
            .client
            .get(url)
            .headers(headers)
            .timeout(self.request_timeout);
        let resp = self.send(req, cancel).await?;
        read_body(resp).await
    }

    async fn send(&self, req: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            resp = req.send() => resp.map_err(|e| Error::Transport(TransportError::Http(e))),
        }
    }
}

/// Status and full body text of a response.
pub async fn read_body(resp: Response) -> Result<(u16, String)> {
    let status = resp.status().as_u16();
    let text = resp
        .text()
        .await
        .map_err(|e| Error::Transport(TransportError::Http(e)))?;
    Ok((status, text))
}

/// Convert a response body into the crate's byte stream.
pub fn byte_stream(resp: Response) -> BoxStream<'static, Bytes> {
    let stream = resp
        .bytes_stream()
        .map_err(|e| Error::Transport(TransportError::Http(e)));
    Box::pin(stream)
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}
