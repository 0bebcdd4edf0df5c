//! Translation of REST, auth and WebSocket failures into [`TransportError`].

use auth::AuthError;
use connector_core::TransportError;
use rest_client::RestError;
use serde::Deserialize;
use std::time::Duration;
use tokio_tungstenite::tungstenite;

/// Error body the gateway returns with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a REST failure. `timeout` is the request timeout that expired, if any.
pub fn from_rest(err: RestError, timeout: Duration) -> TransportError {
    match err {
        RestError::Timeout => TransportError::Timeout(timeout),
        RestError::Connection(msg) | RestError::RequestBuild(msg) => {
            TransportError::Connection(msg)
        }
        RestError::RateLimited { retry_after_ms } => TransportError::RateLimited { retry_after_ms },
        RestError::Unauthorized { message, .. } => TransportError::Authentication(message),
        RestError::NotFound(message) => TransportError::OrderNotFound(message),
        RestError::Parse(msg) => TransportError::Parse(msg),
        RestError::HttpError { status, message } if status >= 500 => {
            TransportError::Connection(format!("server error {}: {}", status, message))
        }
        RestError::HttpError { status, message } => match serde_json::from_str::<ErrorBody>(&message) {
            Ok(body) => TransportError::Rejected {
                code: body.code.map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
                message: body.message.unwrap_or(message),
            },
            Err(_) => TransportError::Rejected {
                code: Some(status.to_string()),
                message,
            },
        },
    }
}

pub fn from_auth(err: AuthError) -> TransportError {
    TransportError::Authentication(err.to_string())
}

pub fn from_ws(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            TransportError::Authentication(format!("handshake refused: {}", response.status()))
        }
        other => TransportError::Connection(other.to_string()),
    }
}
