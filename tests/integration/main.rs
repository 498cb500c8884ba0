//! Integration tests with mock HTTP server

pub mod mock_server;

mod authorization;
mod fallback;
mod streaming;
mod token_lifecycle;
