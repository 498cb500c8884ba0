use crate::types::ModelFamily;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// One failed endpoint attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub endpoint: String,
    /// HTTP status, absent for transport failures.
    pub status: Option<u16>,
    pub message: String,
}

/// Per-call statistics for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallStats {
    pub request_id: String,
    pub session_id: String,
    pub model: String,
    pub family: ModelFamily,
    /// Endpoint that answered.
    pub endpoint: String,
    pub http_status: u16,
    /// Failed attempts before the successful one, in order.
    pub attempts: Vec<AttemptRecord>,
    /// Time to response headers (streaming) or full body (batch).
    pub duration_ms: u64,
    pub upstream_request_id: Option<String>,
}

impl CallStats {
    pub fn failed_attempts(&self) -> usize {
        self.attempts.len()
    }
}

/// Caller-side cancellation of one call.
///
/// Cancelling aborts the in-flight HTTP request, stops the frame reader and wakes the
/// idle-timeout wait. The stream then yields a single `Err(Error::Cancelled)`.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
