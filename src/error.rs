use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "endpoints[0]", "oauth.client_id")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "token_manager")
    pub source: Option<String>,
    /// HTTP status code when the error came from an upstream response
    pub status_code: Option<u16>,
    /// Client request id of the call that failed
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Structured authorization failures.
///
/// These are returned (never panicked) so the host UI can show them in-context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authorization callback did not echo a state token")]
    MissingState,

    #[error("authorization callback state does not match the issued state")]
    StateMismatch,

    #[error("authorization callback carried no code")]
    MissingCode,

    #[error("provider denied authorization: {0}")]
    ProviderDenied(String),

    #[error("authorization callback did not arrive within {timeout_secs}s")]
    CallbackTimeout { timeout_secs: u64 },

    #[error("authorization callback failed: {0}")]
    Callback(String),

    #[error("token endpoint returned HTTP {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("token response carried no access token")]
    MissingAccessToken,

    #[error("user info request failed: {0}")]
    UserInfo(String),
}

/// Unified error type for the bridge
/// This aggregates all low-level errors into actionable, high-level categories
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed {what} payload: {details}")]
    MalformedPayload { what: String, details: String },

    #[error("Remote error: HTTP {status} from {endpoint}: {message}")]
    Remote {
        status: u16,
        message: String,
        endpoint: String,
        /// Number of endpoints tried before giving up.
        attempts: usize,
    },

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("Re-authorization required: {reason}")]
    ReauthorizationRequired { reason: String },

    #[error("Secret store error: {0}")]
    SecretStore(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Stream idle for more than {idle_ms}ms")]
    IdleTimeout { idle_ms: u64 },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if let Some(status) = ctx.status_code {
        parts.push(format!("status: {}", status));
    }
    if let Some(ref id) = ctx.request_id {
        parts.push(format!("request_id: {}", id));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn malformed(what: impl Into<String>, details: impl Into<String>) -> Self {
        Error::MalformedPayload {
            what: what.into(),
            details: details.into(),
        }
    }

    pub fn reauthorize(reason: impl Into<String>) -> Self {
        Error::ReauthorizationRequired {
            reason: reason.into(),
        }
    }

    /// True when the caller should prompt for a fresh authorization rather than show the error.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Error::ReauthorizationRequired { .. })
    }

    /// Caller-initiated cancellation, as opposed to a natural stream end or a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(crate::transport::TransportError::Http(e))
    }
}
