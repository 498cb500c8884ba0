//! Loopback listener for the OAuth redirect.
//!
//! Owns a minimal HTTP/1.1 listener on `127.0.0.1:<port>` for the duration of one
//! interactive flow. Requests to other paths (favicon probes and the like) get a 404
//! and the listener keeps waiting.

use crate::error::AuthError;
use crate::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

const MAX_REQUEST_HEAD: usize = 16 * 1024;

const SUCCESS_PAGE: &str = "<!doctype html><html><body><h3>Authorization complete.</h3>\
<p>You can close this window and return to the application.</p></body></html>";

/// Parsed redirect parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn from_query(query: &str) -> Self {
        let mut params = Self {
            code: None,
            state: None,
            error: None,
            error_description: None,
        };
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            let v = Some(v.into_owned());
            match k.as_ref() {
                "code" => params.code = v,
                "state" => params.state = v,
                "error" => params.error = v,
                "error_description" => params.error_description = v,
                _ => {}
            }
        }
        params
    }

    /// Check the echoed state and extract the code.
    pub fn into_code(self, expected_state: &str) -> std::result::Result<String, AuthError> {
        if let Some(error) = self.error {
            let reason = match self.error_description {
                Some(desc) => format!("{}: {}", error, desc),
                None => error,
            };
            return Err(AuthError::ProviderDenied(reason));
        }
        match self.state.as_deref() {
            None | Some("") => return Err(AuthError::MissingState),
            Some(s) if s != expected_state => return Err(AuthError::StateMismatch),
            Some(_) => {}
        }
        match self.code {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(AuthError::MissingCode),
        }
    }
}

pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
    path: String,
}

impl CallbackServer {
    /// Bind the loopback listener. Port `0` selects an ephemeral port.
    pub async fn bind(port: u16, path: impl Into<String>) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            path: path.into(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the redirect and return the authorization code.
    pub async fn wait_for_code(self, expected_state: &str, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, self.accept_loop(expected_state)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Auth(AuthError::CallbackTimeout {
                timeout_secs: timeout.as_secs(),
            })),
        }
    }

    async fn accept_loop(&self, expected_state: &str) -> Result<String> {
        loop {
            let (mut socket, peer) = self.listener.accept().await?;
            let target = match read_request_target(&mut socket).await {
                Ok(target) => target,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "unreadable callback request");
                    continue;
                }
            };
            let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
            if path != self.path {
                debug!(path = %path, "ignoring request outside the callback path");
                let _ = respond(&mut socket, "404 Not Found", "Not found").await;
                continue;
            }

            let outcome = CallbackParams::from_query(query).into_code(expected_state);
            let _ = match &outcome {
                Ok(_) => respond(&mut socket, "200 OK", SUCCESS_PAGE).await,
                Err(e) => {
                    let page = format!(
                        "<!doctype html><html><body><h3>Authorization failed.</h3>\
                         <p>{}</p></body></html>",
                        html_escape(&e.to_string())
                    );
                    respond(&mut socket, "400 Bad Request", &page).await
                }
            };
            return outcome.map_err(Error::Auth);
        }
    }
}

async fn read_request_target(socket: &mut TcpStream) -> Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST_HEAD {
            return Err(Error::Auth(AuthError::Callback("request head too large".into())));
        }
    }
    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(target.to_string()),
        _ => Err(Error::Auth(AuthError::Callback(format!(
            "unexpected request line: {}",
            request_line
        )))),
    }
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
