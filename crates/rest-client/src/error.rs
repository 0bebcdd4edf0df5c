//! REST client error types.

use thiserror::Error;

/// Errors that can occur during REST API calls.
#[derive(Debug, Error)]
pub enum RestError {
    /// Non-success status not covered by a more specific variant.
    #[error("HTTP error: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message or response body.
        message: String,
    },

    /// 401 or 403: credentials refused.
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// 404: the addressed resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request timed out.
    #[error("Request timeout")]
    Timeout,

    /// Connection error (network issue).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failed to parse response body as JSON.
    #[error("JSON parse error: {0}")]
    Parse(String),

    /// Rate limited by the server.
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited {
        /// Wait suggested by a `Retry-After` header, if any.
        retry_after_ms: Option<u64>,
    },

    /// Failed to build the HTTP request.
    #[error("Request build error: {0}")]
    RequestBuild(String),
}

impl RestError {
    /// Classify a non-success response.
    pub fn from_status(status: u16, body: String, retry_after_ms: Option<u64>) -> Self {
        match status {
            401 | 403 => RestError::Unauthorized {
                status,
                message: body,
            },
            404 => RestError::NotFound(body),
            429 => RestError::RateLimited { retry_after_ms },
            _ => RestError::HttpError {
                status,
                message: body,
            },
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            RestError::Timeout | RestError::Connection(_) | RestError::RateLimited { .. } => true,
            RestError::HttpError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RestError::RateLimited { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RestError::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RestError::Timeout
        } else if err.is_connect() {
            RestError::Connection(err.to_string())
        } else if err.is_decode() {
            RestError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            RestError::from_status(status.as_u16(), err.to_string(), None)
        } else {
            RestError::Connection(err.to_string())
        }
    }
}
