use std::time::Duration;
use thiserror::Error;

/// Errors returned by a [`CaseService`](crate::CaseService).
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Credentials were rejected. Re-authentication is the caller's job.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The call did not finish before its deadline.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Connection, TLS or body-read failure.
    #[error("request failed: {0}")]
    Transport(String),

    /// Non-success HTTP status other than 401/403.
    #[error("service returned {code}: {message}")]
    Status { code: u16, message: String },

    /// The response body was not what we expected.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request could not be built (bad base URL, empty id).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Worth retrying later by user action: network, timeout or 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout { .. } | ApiError::Transport(_) => true,
            ApiError::Status { code, .. } => *code >= 500,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Short text for a status bar.
    pub fn short_message(&self) -> String {
        match self {
            ApiError::Unauthorized(_) => "Not authorized - re-authenticate and retry".to_string(),
            ApiError::Status { code, .. } => format!("Service error {}", code),
            other => other.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
