use crate::config::ConfigError;
use execution_core::RuleViolation;
use std::time::Duration;
use thiserror::Error;

/// Broad class of a failure, deciding how callers react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeout or connection failure: log, retry next cycle.
    Network,
    /// The exchange refused the request: never retried automatically.
    ExchangeRejection,
    /// A record could not be decoded: drop it, keep going.
    Parse,
    /// Credentials refused: fatal for the connector.
    Authentication,
    /// Local condition (shutdown, unknown order, rule check).
    Local,
}

/// Errors reported by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("rate limited by exchange (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("exchange rejected request (code {code:?}): {message}")]
    Rejected { code: Option<String>, message: String },

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("subscription closed")]
    SubscriptionClosed,
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout(_)
            | Self::Connection(_)
            | Self::RateLimited { .. }
            | Self::SubscriptionClosed => ErrorKind::Network,
            Self::Rejected { .. } | Self::OrderNotFound(_) => ErrorKind::ExchangeRejection,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Parse(_) => ErrorKind::Parse,
        }
    }

    /// Check if this error is transient and the request can be retried later.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Network
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    pub fn is_order_not_found(&self) -> bool {
        matches!(self, Self::OrderNotFound(_))
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            code: None,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Errors surfaced by connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("order refused by trading rules: {0}")]
    RuleViolation(#[from] RuleViolation),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("order {0} is not tracked")]
    OrderNotTracked(String),

    #[error("order {0} is already tracked")]
    DuplicateOrderId(String),

    #[error("order {0} has no exchange order id yet")]
    MissingExchangeOrderId(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("connector is not running")]
    NotRunning,

    #[error("shutdown requested")]
    Shutdown,
}

impl ConnectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(e) => e.kind(),
            Self::Timeout { .. } => ErrorKind::Network,
            Self::RuleViolation(_)
            | Self::OrderNotTracked(_)
            | Self::DuplicateOrderId(_)
            | Self::MissingExchangeOrderId(_)
            | Self::Config(_)
            | Self::NotRunning
            | Self::Shutdown => ErrorKind::Local,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Network
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }

    pub fn is_order_not_found(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_order_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_kinds() {
        assert_eq!(TransportError::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Network);
        assert_eq!(TransportError::Connection("reset".into()).kind(), ErrorKind::Network);
        assert_eq!(
            TransportError::RateLimited { retry_after_ms: Some(500) }.kind(),
            ErrorKind::Network
        );
        assert_eq!(TransportError::rejected("bad price").kind(), ErrorKind::ExchangeRejection);
        assert_eq!(TransportError::Authentication("key".into()).kind(), ErrorKind::Authentication);
        assert_eq!(TransportError::Parse("eof".into()).kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_retryable() {
        assert!(TransportError::SubscriptionClosed.is_retryable());
        assert!(!TransportError::rejected("nope").is_retryable());
        assert!(!TransportError::Authentication("key".into()).is_retryable());
    }

    #[test]
    fn test_connector_error_wraps_transport() {
        let err: ConnectorError = TransportError::Authentication("expired".into()).into();
        assert!(err.is_auth());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "authentication failed: expired");

        let err: ConnectorError = TransportError::OrderNotFound("42".into()).into();
        assert!(err.is_order_not_found());
    }

    #[test]
    fn test_timeout_is_network() {
        let err = ConnectorError::Timeout {
            operation: "place_order",
            timeout: Duration::from_secs(10),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("place_order"));
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(TransportError::from(err).kind(), ErrorKind::Parse);
    }
}
