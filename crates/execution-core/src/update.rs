//! Inbound order and trade records, as delivered by either reconciliation channel.

use crate::order::OrderState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order status report carrying the exchange's own status token.
///
/// At least one of the two ids must be present for the record to be matched
/// to a tracked order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    /// Exchange-specific status token, translated through a `StatusTable`.
    pub status: String,
    /// Milliseconds since the Unix epoch.
    pub update_timestamp: u64,
    /// Rejection or cancellation reason, when the exchange gives one.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Order status report already expressed in the shared state enum.
///
/// Produced by translating an [`OrderUpdate`], or directly by the connector
/// for locally decided outcomes (a rejected submission, a synchronous cancel).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStateUpdate {
    pub client_order_id: Option<String>,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub new_state: OrderState,
    pub update_timestamp: u64,
    pub reason: Option<String>,
}

impl OrderStateUpdate {
    /// Update addressed by client order id only.
    pub fn for_client_id(
        client_order_id: impl Into<String>,
        trading_pair: impl Into<String>,
        new_state: OrderState,
        update_timestamp: u64,
    ) -> Self {
        Self {
            client_order_id: Some(client_order_id.into()),
            exchange_order_id: None,
            trading_pair: trading_pair.into(),
            new_state,
            update_timestamp,
            reason: None,
        }
    }

    pub fn with_exchange_order_id(mut self, exchange_order_id: impl Into<String>) -> Self {
        self.exchange_order_id = Some(exchange_order_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// One execution (fill) of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdate {
    /// Exchange trade / execution id, unique per fill.
    pub trade_id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub fill_base_amount: Decimal,
    pub fill_quote_amount: Decimal,
    pub fill_price: Decimal,
    #[serde(default)]
    pub fee_asset: Option<String>,
    #[serde(default)]
    pub fee_amount: Decimal,
    /// Milliseconds since the Unix epoch.
    pub fill_timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trade_update_decimal_strings() {
        let json = r#"{
            "trade_id": "t-1",
            "exchange_order_id": "88",
            "trading_pair": "BTC-USDT",
            "fill_base_amount": "0.5",
            "fill_quote_amount": "15000.25",
            "fill_price": "30000.5",
            "fee_asset": "USDT",
            "fee_amount": "0.015",
            "fill_timestamp": 1700000000000
        }"#;
        let trade: TradeUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(trade.fill_base_amount, dec!(0.5));
        assert_eq!(trade.fill_quote_amount, dec!(15000.25));
        assert_eq!(trade.client_order_id, None);
        assert_eq!(trade.fee_amount, dec!(0.015));
    }

    #[test]
    fn test_order_update_optional_fields() {
        let json = r#"{"client_order_id":"c1","trading_pair":"ETH-USDT",
                       "status":"NEW","update_timestamp":1}"#;
        let update: OrderUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.exchange_order_id, None);
        assert_eq!(update.reason, None);
        assert_eq!(update.status, "NEW");
    }

    #[test]
    fn test_state_update_builder() {
        let update = OrderStateUpdate::for_client_id("c1", "BTC-USDT", OrderState::Failed, 5)
            .with_reason("insufficient balance");
        assert_eq!(update.client_order_id.as_deref(), Some("c1"));
        assert_eq!(update.reason.as_deref(), Some("insufficient balance"));
        assert_eq!(update.exchange_order_id, None);
    }
}
