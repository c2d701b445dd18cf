//! Error taxonomy shared across the workspace.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from sandboxed tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The path escaped the sandbox root or traversed a symlink.
    #[error("security violation: {0}")]
    SecurityViolation(String),
    /// The requested file does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// An underlying filesystem failure.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the LLM transport.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider is throttling us (HTTP 429 / RESOURCE_EXHAUSTED).
    #[error("throttled by provider: {0}")]
    Throttled(String),
    /// Credentials were rejected. Fatal.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The provider rejected the request shape. Fatal for the turn.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// A transient transport failure (timeout, connection reset, 5xx).
    #[error("transient transport failure: {0}")]
    Transient(String),
    /// The response body did not parse into the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Anything the transport could not classify.
    #[error("unknown provider failure: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Whether the rate controller should retry this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Throttled(_) | ProviderError::Transient(_) | ProviderError::Unknown(_)
        )
    }
}

/// Errors from the session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No session exists for the given id or name.
    #[error("session not found: {0}")]
    NotFound(String),
    /// An entry failed to serialize or deserialize.
    #[error("serialization failed: {0}")]
    Serialization(String),
    /// An underlying filesystem failure.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal configuration problems detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `GEMINI_API_KEY` is required.
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
    /// A configured system prompt path could not be read.
    #[error("system prompt at {path} is not readable: {source}")]
    SystemPrompt {
        /// The configured path.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },
    /// An environment variable held a value the core cannot interpret.
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// The variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Errors surfaced to the shell from a user turn.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Retries against a throttling provider were exhausted.
    #[error("rate limit exhausted for model {model}")]
    RateExceeded {
        /// The throttled model.
        model: String,
    },
    /// The provider rejected our credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The provider rejected the request; the turn is aborted.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The turn was cancelled at a suspension point.
    #[error("turn cancelled")]
    Cancelled,
    /// The turn exceeded its wall-clock budget.
    #[error("turn timed out after {0:?}")]
    Timeout(Duration),
    /// A non-retryable or retry-exhausted transport failure.
    #[error("transport failure: {0}")]
    Transport(ProviderError),
    /// Journaling failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The core was misconfigured.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TurnError {
    /// Fold a terminal provider error into the turn-level taxonomy.
    #[must_use]
    pub fn from_provider(err: ProviderError, model: &str) -> Self {
        match err {
            ProviderError::Throttled(_) => TurnError::RateExceeded {
                model: model.to_string(),
            },
            ProviderError::Unauthorized(msg) => TurnError::Unauthorized(msg),
            ProviderError::BadRequest(msg) => TurnError::BadRequest(msg),
            other => TurnError::Transport(other),
        }
    }
}
