//! The exchange boundary.
//!
//! A [`Transport`] performs authenticated REST calls and owns the persistent
//! user stream subscription. The connector never sees wire formats: responses
//! arrive as the shared update types, and pushed messages are sorted by
//! [`Transport::classify`].

use crate::error::TransportError;
use crate::messages::{self, UserStreamMessage};
use async_trait::async_trait;
use execution_core::{Balance, OrderSide, OrderType, OrderUpdate, TradeUpdate, TradingRule};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Parameters of a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Decimal,
}

/// Exchange acknowledgement of a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub exchange_order_id: String,
    /// Milliseconds since the Unix epoch.
    pub update_timestamp: u64,
}

/// Parameters of a cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub trading_pair: String,
}

/// Items pushed by a live subscription.
///
/// The channel closing means the connection dropped; an `Err` item reports why.
pub type UserStream = mpsc::Receiver<Result<Value, TransportError>>;

/// Authenticated access to one exchange.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Exchange name, used in logs.
    fn name(&self) -> &str;

    /// Cheap authenticated call proving connectivity and credentials.
    async fn check_network(&self) -> Result<(), TransportError>;

    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder, TransportError>;

    async fn cancel_order(&self, request: &CancelRequest) -> Result<(), TransportError>;

    /// Every asset with a balance, keyed by asset.
    async fn get_balances(&self) -> Result<HashMap<String, Balance>, TransportError>;

    /// Current status of one order.
    ///
    /// # Errors
    /// [`TransportError::OrderNotFound`] when the exchange does not know the order.
    async fn get_order_status(
        &self,
        exchange_order_id: &str,
        trading_pair: &str,
    ) -> Result<OrderUpdate, TransportError>;

    /// Every fill of one order so far.
    async fn get_trade_fills(
        &self,
        exchange_order_id: &str,
        trading_pair: &str,
    ) -> Result<Vec<TradeUpdate>, TransportError>;

    /// Trading rules of every listed pair.
    async fn get_trading_rules(&self) -> Result<Vec<TradingRule>, TransportError> {
        Ok(Vec::new())
    }

    /// Open the user stream on the given channels.
    async fn subscribe(&self, channels: &[String]) -> Result<UserStream, TransportError>;

    /// Sort one pushed message. Defaults to the canonical `"kind"` format.
    fn classify(&self, value: &Value) -> Result<UserStreamMessage, TransportError> {
        messages::classify(value).map_err(TransportError::from)
    }
}
