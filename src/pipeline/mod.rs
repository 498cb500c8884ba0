//! 流水线处理模块：字节流 → SSE 帧，附带取消与空闲超时。
//!
//! # Streaming Pipeline
//!
//! Byte-level stages of a streaming call. Nothing here knows about LLM payloads.
//!
//! ```text
//! HTTP bytes → decode_sse → (adapter) → with_idle_timeout → caller
//!                 │                           │
//!          CancellationToken ─────────────────┘
//! ```
//!
//! One [`CancellationToken`](tokio_util::sync::CancellationToken) per call fans out to
//! every stage: the decoder stops reading and releases the body, and the idle wrapper
//! stops waiting. A cancelled stream ends with a single `Err(Error::Cancelled)` so
//! consumers can tell it apart from a natural end (`None`).
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`sse`] | Incremental SSE frame parser |
//! | [`decode`] | Async byte stream → frame stream |
//! | [`idle`] | Idle-timeout wrapper |

pub mod decode;
pub mod idle;
pub mod sse;


pub use decode::decode_sse;
pub use idle::with_idle_timeout;
pub use sse::{SseEvent, SseParser};
