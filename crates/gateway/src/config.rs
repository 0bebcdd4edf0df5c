//! Gateway endpoint configuration.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Where the gateway lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Connector name, used in logs.
    pub name: String,
    /// REST base URL, e.g. `https://gateway.example.com`.
    pub rest_url: String,
    /// User stream URL, e.g. `wss://gateway.example.com/ws`.
    pub ws_url: String,
    /// Timeout of every REST request.
    pub request_timeout: Duration,
    /// Timeout of the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Buffered user stream messages before the reader waits.
    pub stream_buffer: usize,
}

impl GatewayConfig {
    pub fn new(rest_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            name: "gateway".to_string(),
            rest_url: rest_url.into(),
            ws_url: ws_url.into(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            stream_buffer: 1024,
        }
    }

    /// Load from `GATEWAY_*` environment variables.
    ///
    /// `GATEWAY_REST_URL` and `GATEWAY_WS_URL` are required; `GATEWAY_NAME`
    /// and `GATEWAY_REQUEST_TIMEOUT_MS` are optional.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, GatewayConfigError> {
        dotenvy::dotenv().ok();

        let required = |key: &'static str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(GatewayConfigError::Missing(key))
        };

        let mut config = Self::new(required("GATEWAY_REST_URL")?, required("GATEWAY_WS_URL")?);
        if let Ok(name) = std::env::var("GATEWAY_NAME") {
            config.name = name;
        }
        if let Ok(raw) = std::env::var("GATEWAY_REQUEST_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| GatewayConfigError::Invalid {
                key: "GATEWAY_REQUEST_TIMEOUT_MS",
                value: raw.clone(),
            })?;
            config.request_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let config = GatewayConfig::new("http://localhost:8080", "ws://localhost:8080/ws");
        assert_eq!(config.name, "gateway");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_from_env() {
        std::env::remove_var("GATEWAY_REST_URL");
        std::env::remove_var("GATEWAY_WS_URL");
        assert!(matches!(
            GatewayConfig::from_env(),
            Err(GatewayConfigError::Missing("GATEWAY_REST_URL"))
        ));

        std::env::set_var("GATEWAY_REST_URL", "http://gw");
        std::env::set_var("GATEWAY_WS_URL", "ws://gw/ws");
        std::env::set_var("GATEWAY_REQUEST_TIMEOUT_MS", "1500");
        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.rest_url, "http://gw");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));

        std::env::remove_var("GATEWAY_REST_URL");
        std::env::remove_var("GATEWAY_WS_URL");
        std::env::remove_var("GATEWAY_REQUEST_TIMEOUT_MS");
    }
}
