//! 类型系统模块：调用方与桥之间的规范化请求/响应类型。
//!
//! # Types Module
//!
//! Provider-agnostic ("canonical") request and response types. Nothing in here knows
//! about wire formats; [`crate::transform`] and [`crate::adapter`] translate.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and content parts |
//! | [`ChatRequest`] | Messages + system + tools + generation config |
//! | [`ToolDefinition`] | Tool declaration with JSON-schema parameters |
//! | [`CanonicalResponse`] | Streamed chunk or batched response |
//! | [`ModelFamily`] | `claude`, `gemini-flash`, `gemini-pro` |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_bridge::types::{ChatRequest, Message, ToolDefinition};
//!
//! let request = ChatRequest::new("gemini-2.5-pro", vec![Message::user("What's the weather?")])
//!     .system("You are a helpful assistant")
//!     .tools(vec![ToolDefinition::new("get_weather").with_parameters(serde_json::json!({
//!         "type": "object",
//!         "properties": { "location": { "type": "string" } }
//!     }))]);
//! assert_eq!(request.tools.len(), 1);
//! ```

pub mod generation;
pub mod message;
pub mod model;
pub mod request;
pub mod response;
pub mod tool;

pub use generation::{GenerationConfig, ThinkingEffort, ThinkingRequest};
pub use message::{ContentPart, Message, MessageRole};
pub use model::ModelFamily;
pub use request::ChatRequest;
pub use response::{CanonicalResponse, ResponsePart, StreamSummary, UsageMetadata};
pub use tool::{ToolChoice, ToolDefinition};
