//! Error types for the controller.
//!
//! The taxonomy drives retry behavior: transient orchestrator and data-plane
//! errors requeue with backoff, inconsistent cluster state aborts the
//! iteration without auto-remediation, and invalid specs wait for the user.

use std::time::Duration;

use thiserror::Error;

/// Error type for controller operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error (transient orchestrator).
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Redis or Sentinel unreachable or misbehaving (transient data-plane).
    #[error("Redis error: {0}")]
    Redis(String),

    /// The observed cluster contradicts itself (multiple masters, pod-count
    /// mismatch). The operator aborts and lets the next resync retry once
    /// Sentinel or the orchestrator has settled.
    #[error("Inconsistent cluster state: {0}")]
    InconsistentState(String),

    /// Validation error in the resource spec. Not retried until the spec
    /// changes.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing required field in a resource.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<crate::client::RedisError> for Error {
    fn from(err: crate::client::RedisError) -> Self {
        Error::Redis(err.to_string())
    }
}

impl Error {
    /// Check if this error indicates a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on rate limiting, server errors, and transport failures
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Redis(_) | Error::InconsistentState(_) => true,
            Error::Validation(_) | Error::MissingField(_) | Error::Serialization(_) => false,
        }
    }

    /// Stable label value for the errors-by-kind metric.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::Kube(_) => "kube",
            Error::Redis(_) => "redis",
            Error::InconsistentState(_) => "inconsistent_state",
            Error::Validation(_) => "validation",
            Error::MissingField(_) => "missing_field",
            Error::Serialization(_) => "serialization",
        }
    }
}

/// Base delay of the error backoff.
pub const BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Cap of the error backoff.
pub const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Capped exponential backoff for the nth consecutive failure (1-based).
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(exp));
    delay.min(BACKOFF_CAP)
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;
