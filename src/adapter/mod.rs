//! 响应适配模块：提供方负载 → 规范响应，附带参数修正与错误改写。
//!
//! # Response Adapter
//!
//! Everything that happens to upstream output before the caller sees it.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`response`] | Stateful per-call adapter (Gemini + Anthropic shapes) |
//! | [`normalize`] | Tool-call argument re-typing, tool-result decoding |
//! | [`repair`] | Truncated JSON repair |
//! | [`errors`] | Upstream error parsing and message rewriting |
//!
//! The adapter is the only writer of the thought signature cache and the only
//! reader of the sanitized-name map on the response side.

pub mod errors;
pub mod normalize;
pub mod repair;
pub mod response;

pub use errors::{
    extract_error, parse_upstream_error, rewrite_error, rewrite_error_body, UpstreamError,
};
pub use normalize::{clean_escapes, normalize_arg, normalize_function_response, normalize_tool_args};
pub use repair::{repair_truncated_json, try_repair};
pub use response::{unwrap_payload, ResponseAdapter};
