//! 统一调用入口：凭证解析、请求转换、端点回退与流式适配。
//!
//! Client surface of the bridge.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`ProviderClient`] | Orchestrates one call: credential, transform, endpoint fallback, adaptation |
//! | [`ProviderClientBuilder`] | Wires configuration, credentials, caches and transport |
//! | [`ChatStream`] | Canonical chunk stream with idle timeout and cancellation |
//! | [`CallStats`] | Per-call observability: endpoint, failed attempts, timing |
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod execution;
pub mod stream;
pub mod types;

pub use builder::ProviderClientBuilder;
pub use core::{ProviderClient, INTERLEAVED_THINKING_BETA};
pub use stream::ChatStream;
pub use types::{AttemptRecord, CallStats, CancelHandle};
