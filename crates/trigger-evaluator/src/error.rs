//! Error types for trigger evaluation
//!
//! Store failures and request rejections are the only errors an evaluation
//! surfaces. Malformed historical events and empty windows are not errors:
//! they are skipped or reported as an outcome.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by blob and state store backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// PostgreSQL error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller-enforced timeout elapsed
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a Backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Errors raised while delivering a chat notification
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Transport failure or timeout
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Webhook answered with a non-success status
    #[error("Webhook rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Errors that fail a whole evaluation
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Missing or invalid rule parameters; rejected before any event I/O
    #[error("Bad rule spec: {0}")]
    BadRuleSpec(String),

    /// Malformed reading (empty device, bad timestamp, unknown beacon)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A store call failed or timed out
    #[error("Store unavailable during {operation}: {source}")]
    StoreUnavailable {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl EvaluationError {
    /// Wrap a store error with the pipeline step it happened in
    pub fn store(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::StoreUnavailable { operation, source }
    }

    /// Whether the request itself was at fault (retrying it cannot help)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EvaluationError::BadRuleSpec(_) | EvaluationError::InvalidRequest(_)
        )
    }

    /// Short label used in audit entries and logs
    pub fn label(&self) -> &'static str {
        match self {
            EvaluationError::BadRuleSpec(_) => "bad_rule_spec",
            EvaluationError::InvalidRequest(_) => "invalid_request",
            EvaluationError::StoreUnavailable { .. } => "store_unavailable",
        }
    }
}
