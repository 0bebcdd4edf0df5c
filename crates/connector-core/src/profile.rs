//! Per-exchange data: status vocabulary, rate limits, stream channels.
//!
//! Everything that differs between exchanges but is not code lives here, so
//! one connector implementation can drive any of them.

use execution_core::{OrderState, StatusTable};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use throttler::RateLimit;

/// Rate limit id charged for each kind of request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitIds {
    pub place_order: String,
    pub cancel_order: String,
    pub balances: String,
    pub order_status: String,
    pub trade_fills: String,
    pub trading_rules: String,
    pub check_network: String,
}

impl Default for LimitIds {
    fn default() -> Self {
        Self {
            place_order: "place_order".to_string(),
            cancel_order: "cancel_order".to_string(),
            balances: "balances".to_string(),
            order_status: "order_status".to_string(),
            trade_fills: "trade_fills".to_string(),
            trading_rules: "trading_rules".to_string(),
            check_network: "check_network".to_string(),
        }
    }
}

/// Static description of one exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeProfile {
    pub name: String,
    pub status_table: StatusTable,
    pub rate_limits: Vec<RateLimit>,
    #[serde(default)]
    pub limit_ids: LimitIds,
    /// Channels requested when subscribing to the user stream.
    pub user_stream_channels: Vec<String>,
    /// True if a successful cancel response means the order is already
    /// canceled; false if confirmation arrives later as a status update.
    #[serde(default)]
    pub cancel_is_synchronous: bool,
    /// Pairs this connector trades.
    #[serde(default)]
    pub trading_pairs: Vec<String>,
}

/// Shared pool every endpoint limit is linked to.
pub const GLOBAL_LIMIT_ID: &str = "global";

impl ExchangeProfile {
    /// Profile for the canonical gateway format.
    ///
    /// A global pool of 1200 requests per minute, with tighter per-endpoint
    /// limits linked to it.
    pub fn canonical(name: impl Into<String>) -> Self {
        let ids = LimitIds::default();
        let minute = Duration::from_secs(60);
        let endpoint = |id: &str, capacity: u32, window: Duration| {
            RateLimit::new(id, capacity, window).with_linked(GLOBAL_LIMIT_ID, 1)
        };

        let rate_limits = vec![
            RateLimit::new(GLOBAL_LIMIT_ID, 1200, minute),
            endpoint(&ids.place_order, 50, Duration::from_secs(10)),
            endpoint(&ids.cancel_order, 50, Duration::from_secs(10)),
            endpoint(&ids.balances, 60, minute),
            endpoint(&ids.order_status, 600, minute),
            endpoint(&ids.trade_fills, 600, minute),
            endpoint(&ids.trading_rules, 10, minute),
            endpoint(&ids.check_network, 60, minute),
        ];

        Self {
            name: name.into(),
            status_table: StatusTable::canonical(),
            rate_limits,
            limit_ids: ids,
            user_stream_channels: vec!["orders".to_string(), "trades".to_string(), "balances".to_string()],
            cancel_is_synchronous: false,
            trading_pairs: Vec::new(),
        }
    }

    pub fn with_trading_pairs(mut self, pairs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.trading_pairs = pairs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_synchronous_cancel(mut self, synchronous: bool) -> Self {
        self.cancel_is_synchronous = synchronous;
        self
    }

    /// Add or override one status token.
    pub fn with_status(mut self, token: &str, state: OrderState) -> Self {
        self.status_table.insert(token, state);
        self
    }
}
