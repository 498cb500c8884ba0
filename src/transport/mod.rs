//! 传输层：共享 HTTP 客户端（连接池、代理、HTTP/2 保活）与取消感知的发送。

pub mod http;

pub use http::{byte_stream, read_body, HttpTransport, TransportError};
