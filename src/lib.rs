//! # ai-lib-bridge
//!
//! 面向 Code Assist 网关（Antigravity / Gemini CLI）的协议桥：统一请求、流式解析与令牌生命周期。
//!
//! Protocol bridge that presents one canonical chat contract on top of the Google
//! Code Assist gateway, which serves both the Claude and Gemini model families behind
//! a shared request envelope.
//!
//! ## Overview
//!
//! A call flows through the crate like this:
//!
//! ```text
//! ChatRequest ─► TokenManager (credential) ─► transform (wire body)
//!             ─► ProviderClient (endpoint fallback) ─► pipeline::sse (frames)
//!             ─► adapter (canonical chunks + cache side effects) ─► caller
//! ```
//!
//! ## Key Features
//!
//! - **OAuth lifecycle**: [`auth::TokenManager`] handles authorize/exchange/refresh/revoke with
//!   expiry-aware credential resolution and status notifications
//! - **Family-aware wire format**: [`transform`] builds Anthropic Messages or Gemini
//!   `generateContent` bodies inside the Code Assist envelope
//! - **Streaming-first**: incremental SSE parsing with cancellation and idle timeout
//! - **Response repair**: tool-name restoration, schema-driven argument re-typing,
//!   truncated JSON repair and thought-signature caching
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_lib_bridge::{BridgeConfig, ChatRequest, Message, ProviderClient};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_bridge::Result<()> {
//!     let client = ProviderClient::builder(BridgeConfig::default())
//!         .with_static_token("ya29.token")
//!         .build()?;
//!
//!     let request = ChatRequest::new("gemini-2.5-flash", vec![Message::user("Hello")]);
//!     let (mut stream, _cancel) = client.chat_stream(request).await?;
//!     while let Some(chunk) = stream.next().await {
//!         print!("{}", chunk?.text());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | SSE frame parsing, cancellation and idle-timeout wrappers |
//! | [`auth`] | OAuth flows, token records and secret stores |
//! | [`cache`] | Tool schema / sanitized-name cache and thought signature cache |
//! | [`transform`] | Canonical request → provider wire body |
//! | [`adapter`] | Provider payload → canonical response |
//! | [`drivers`] | Code Assist provider strategies |
//! | [`client`] | Orchestrator with endpoint fallback |
//! | [`types`] | Canonical request/response types |

pub mod adapter;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod drivers;
pub mod logging;
pub mod pipeline;
pub mod transform;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{CallStats, CancelHandle, ChatStream, ProviderClient, ProviderClientBuilder};
pub use config::BridgeConfig;
pub use types::{
    message::{ContentPart, Message, MessageRole},
    model::ModelFamily,
    request::ChatRequest,
    response::{CanonicalResponse, ResponsePart, UsageMetadata},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result for pipeline operations
pub type PipeResult<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `PipeResult<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = PipeResult<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{AuthError, Error, ErrorContext};
