//! Connector tuning.
//!
//! Every knob has a default suitable for a spot exchange; `from_env` lets a
//! deployment override any of them with `CONNECTOR_*` variables (a `.env` file
//! is honoured).

use execution_core::TrackerConfig;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}

/// Timing and sizing of one connector instance.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Upper bound on every outbound request.
    pub request_timeout: Duration,
    /// Poll interval while the user stream is quiet.
    pub short_poll_interval: Duration,
    /// Poll interval while the user stream is delivering.
    pub long_poll_interval: Duration,
    /// User stream silence after which polling switches to the short interval.
    pub tick_interval_limit: Duration,
    /// Period of the tick driver that raises the polling signal.
    pub tick_period: Duration,
    /// Lower bound of the resubscribe delay.
    pub user_stream_backoff_min: Duration,
    /// Upper bound of the resubscribe delay.
    pub user_stream_backoff_max: Duration,
    /// How often trading rules are refreshed.
    pub trading_rules_interval: Duration,
    /// Pause after a failed loop iteration before the next attempt.
    pub error_pause: Duration,
    /// Percentage of every rate limit this process may use.
    pub rate_limits_share_pct: f64,
    /// Prefix of generated client order ids.
    pub client_order_id_prefix: String,
    /// Maximum length of generated client order ids (0 for unbounded).
    pub client_order_id_max_len: usize,
    /// How long finished orders are kept for late fills.
    pub cached_order_ttl: Duration,
    /// Maximum number of finished orders kept.
    pub cached_order_capacity: usize,
    /// Not-found reports tolerated before an order is failed.
    pub order_not_found_limit: u32,
    /// How long an order may lack an exchange order id before polling counts
    /// it as not found.
    pub exchange_order_id_timeout: Duration,
    /// Events buffered per event bus subscriber.
    pub event_bus_capacity: usize,
    /// Default deadline for `cancel_all`.
    pub cancel_all_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            short_poll_interval: Duration::from_secs(5),
            long_poll_interval: Duration::from_secs(120),
            tick_interval_limit: Duration::from_secs(60),
            tick_period: Duration::from_secs(1),
            user_stream_backoff_min: Duration::from_secs(5),
            user_stream_backoff_max: Duration::from_secs(30),
            trading_rules_interval: Duration::from_secs(30 * 60),
            error_pause: Duration::from_millis(500),
            rate_limits_share_pct: 100.0,
            client_order_id_prefix: "x-".to_string(),
            client_order_id_max_len: 36,
            cached_order_ttl: Duration::from_secs(30),
            cached_order_capacity: 1000,
            order_not_found_limit: 3,
            exchange_order_id_timeout: Duration::from_secs(10),
            event_bus_capacity: 1024,
            cancel_all_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectorConfig {
    /// Load from `CONNECTOR_*` environment variables, falling back to defaults.
    ///
    /// Durations are given in milliseconds (`*_MS`).
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        let mut config = Self::default();

        override_ms("CONNECTOR_REQUEST_TIMEOUT_MS", &mut config.request_timeout)?;
        override_ms("CONNECTOR_SHORT_POLL_INTERVAL_MS", &mut config.short_poll_interval)?;
        override_ms("CONNECTOR_LONG_POLL_INTERVAL_MS", &mut config.long_poll_interval)?;
        override_ms("CONNECTOR_TICK_INTERVAL_LIMIT_MS", &mut config.tick_interval_limit)?;
        override_ms("CONNECTOR_TICK_PERIOD_MS", &mut config.tick_period)?;
        override_ms("CONNECTOR_WS_BACKOFF_MIN_MS", &mut config.user_stream_backoff_min)?;
        override_ms("CONNECTOR_WS_BACKOFF_MAX_MS", &mut config.user_stream_backoff_max)?;
        override_ms("CONNECTOR_TRADING_RULES_INTERVAL_MS", &mut config.trading_rules_interval)?;
        override_ms("CONNECTOR_EXCHANGE_ORDER_ID_TIMEOUT_MS", &mut config.exchange_order_id_timeout)?;
        override_ms("CONNECTOR_CANCEL_ALL_TIMEOUT_MS", &mut config.cancel_all_timeout)?;
        override_ms("CONNECTOR_CACHED_ORDER_TTL_MS", &mut config.cached_order_ttl)?;
        override_parsed("CONNECTOR_RATE_LIMITS_SHARE_PCT", &mut config.rate_limits_share_pct)?;
        override_parsed("CONNECTOR_CLIENT_ORDER_ID_PREFIX", &mut config.client_order_id_prefix)?;
        override_parsed("CONNECTOR_CLIENT_ORDER_ID_MAX_LEN", &mut config.client_order_id_max_len)?;
        override_parsed("CONNECTOR_ORDER_NOT_FOUND_LIMIT", &mut config.order_not_found_limit)?;
        override_parsed("CONNECTOR_EVENT_BUS_CAPACITY", &mut config.event_bus_capacity)?;

        if !(0.0..=100.0).contains(&config.rate_limits_share_pct) {
            return Err(ConfigError::Invalid {
                key: "CONNECTOR_RATE_LIMITS_SHARE_PCT",
                value: config.rate_limits_share_pct.to_string(),
            });
        }

        Ok(config)
    }

    /// Tracker settings derived from this config.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            cached_order_ttl: self.cached_order_ttl,
            cached_order_capacity: self.cached_order_capacity,
            order_not_found_limit: self.order_not_found_limit,
        }
    }

    /// Poll interval given how long the user stream has been silent.
    pub fn poll_interval(&self, since_last_stream_message: Option<Duration>) -> Duration {
        match since_last_stream_message {
            Some(idle) if idle <= self.tick_interval_limit => self.long_poll_interval,
            _ => self.short_poll_interval,
        }
    }
}

fn override_parsed<T: FromStr>(key: &'static str, slot: &mut T) -> Result<(), ConfigError> {
    match std::env::var(key) {
        Ok(raw) => {
            *slot = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: raw.clone() })?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

fn override_ms(key: &'static str, slot: &mut Duration) -> Result<(), ConfigError> {
    let mut ms = slot.as_millis() as u64;
    override_parsed(key, &mut ms)?;
    *slot = Duration::from_millis(ms);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::default();
        assert_eq!(config.short_poll_interval, Duration::from_secs(5));
        assert_eq!(config.long_poll_interval, Duration::from_secs(120));
        assert_eq!(config.order_not_found_limit, 3);
        assert_eq!(config.rate_limits_share_pct, 100.0);
    }

    #[test]
    fn test_poll_interval_selection() {
        let config = ConnectorConfig::default();
        // Never heard from the stream.
        assert_eq!(config.poll_interval(None), Duration::from_secs(5));
        // Stream is live.
        assert_eq!(
            config.poll_interval(Some(Duration::from_secs(10))),
            Duration::from_secs(120)
        );
        // Stream has gone quiet.
        assert_eq!(
            config.poll_interval(Some(Duration::from_secs(61))),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_tracker_config() {
        let config = ConnectorConfig {
            order_not_found_limit: 7,
            ..Default::default()
        };
        assert_eq!(config.tracker_config().order_not_found_limit, 7);
    }

    #[test]
    fn test_env_override_and_invalid() {
        std::env::set_var("CONNECTOR_ORDER_NOT_FOUND_LIMIT", "5");
        std::env::set_var("CONNECTOR_REQUEST_TIMEOUT_MS", "2500");
        let config = ConnectorConfig::from_env().unwrap();
        assert_eq!(config.order_not_found_limit, 5);
        assert_eq!(config.request_timeout, Duration::from_millis(2500));

        std::env::set_var("CONNECTOR_ORDER_NOT_FOUND_LIMIT", "many");
        let err = ConnectorConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("CONNECTOR_ORDER_NOT_FOUND_LIMIT"));

        std::env::remove_var("CONNECTOR_ORDER_NOT_FOUND_LIMIT");
        std::env::remove_var("CONNECTOR_REQUEST_TIMEOUT_MS");
    }
}
