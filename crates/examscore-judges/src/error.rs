//! Judge error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while obtaining a rubric judgment.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The reviewer service returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid reviewer key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The judge has no record of this item.
    #[error("unknown item: {0}")]
    UnknownItem(String),

    /// The reviewer service returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl JudgeError {
    /// Returns `true` if retrying cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            JudgeError::AuthenticationFailed(_) | JudgeError::UnknownItem(_) => true,
            JudgeError::ApiError { status, .. } => (400..500).contains(status),
            JudgeError::RateLimited { .. } | JudgeError::Timeout(_) | JudgeError::NetworkError(_) => {
                false
            }
        }
    }

    /// Whether an error returned through `anyhow` is a permanent judge error.
    pub(crate) fn permanent(error: &anyhow::Error) -> bool {
        error
            .downcast_ref::<JudgeError>()
            .is_some_and(JudgeError::is_permanent)
    }

    /// The backoff a rate-limited judge asked for.
    pub(crate) fn retry_after(error: &anyhow::Error) -> Option<Duration> {
        match error.downcast_ref::<JudgeError>() {
            Some(JudgeError::RateLimited { retry_after_ms }) => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}
