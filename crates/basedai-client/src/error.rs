//! Error types for the client library.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error response from the API.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// The error detail object from the API.
    pub error: ErrorDetail,
}

/// Detailed error information from the API.
#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    /// The error message text describing what went wrong.
    pub message: String,
}

/// Errors that can occur when talking to a language model endpoint.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network or HTTP request failure.
    ///
    /// DNS resolution, connection failures, or socket errors. Typically retryable.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Middleware layer error (retry policy, retry-after handling).
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// API authentication failure (HTTP 401).
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimitError {
        /// Suggested wait time before retrying, if provided by the API.
        retry_after: Option<Duration>,
    },

    /// Client configuration issue, such as an unparseable base URL.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Request timeout.
    #[error("Timeout error")]
    TimeoutError,

    /// Malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The API rejected the request with a non-retryable status.
    #[error("Request failed: {0}")]
    RequestError(String),

    /// Unexpected or malformed API response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Tools requested but not supported by this client.
    #[error("Tool execution not supported")]
    ToolsNotSupported,

    /// API service unavailable (5xx errors).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Temperature parameter out of valid range.
    #[error("Temperature must be between 0.0 & 2.0")]
    InvalidTemperature,
}

impl ClientError {
    /// Check if this error is potentially retryable.
    ///
    /// Returns `true` for network errors, timeouts, rate limits, and service unavailable errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_)
                | Self::MiddlewareError(_)
                | Self::TimeoutError
                | Self::RateLimitError { .. }
                | Self::ServiceUnavailable(_)
        )
    }

    /// Check if this is an authentication error.
    #[must_use]
    pub const fn is_authentication_error(&self) -> bool {
        matches!(self, Self::AuthenticationError(_))
    }

    /// Get the retry-after duration if this is a rate limit error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitError { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ClientError::TimeoutError.is_retryable());
        assert!(ClientError::ServiceUnavailable("502".into()).is_retryable());
        assert!(ClientError::RateLimitError { retry_after: None }.is_retryable());
        assert!(!ClientError::AuthenticationError("bad key".into()).is_retryable());
        assert!(!ClientError::InvalidResponse("no choices".into()).is_retryable());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let err = ClientError::RateLimitError {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert!(ClientError::TimeoutError.retry_after().is_none());
    }
}
