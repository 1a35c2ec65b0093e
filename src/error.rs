//! Error types for the proof orchestration engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error taxonomy for the orchestration core (spec §7).
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Malformed request, missing fields, out-of-range inputs. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The generator reported a timeout or a temporary condition.
    #[error("transient error: {0}")]
    Transient(String),

    /// Queue closed, pool not running, or worker saturated.
    #[error("resource unavailable: {0}")]
    Resource(String),

    /// Caller or deadline cancelled the job.
    #[error("job cancelled: {0}")]
    Cancelled(String),

    /// The durable repository failed to persist a record.
    #[error("durable store error: {0}")]
    Durable(String),

    /// Delivery to an external callback sink failed after all retries.
    #[error("callback delivery failed: {0}")]
    Callback(String),

    /// Proof or verification request referenced an unknown identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything that doesn't fit the buckets above, including a
    /// worker that crashed while holding a job.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True if the generator's message marks this as a non-retryable
    /// validation failure (spec §4.5, §6): the message begins with
    /// "invalid input" or "validation failed".
    pub fn is_validation_message(message: &str) -> bool {
        message.starts_with("invalid input") || message.starts_with("validation failed")
    }

    /// True if the generator's message marks this as retryable
    /// (spec §4.5): the message contains "timeout" or "temporary".
    pub fn is_transient_message(message: &str) -> bool {
        message.contains("timeout") || message.contains("temporary")
    }
}
