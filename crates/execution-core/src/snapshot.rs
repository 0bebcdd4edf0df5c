//! Persisted tracking state.
//!
//! A [`TrackingSnapshot`] is what the connector hands out for persistence and
//! takes back after a restart. Decimals serialize as strings so no precision is
//! lost through JSON.

use crate::in_flight::InFlightOrder;
use crate::order::{OrderSide, OrderState, OrderType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializable form of one [`InFlightOrder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub client_order_id: String,
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub order_type: OrderType,
    #[serde(rename = "trade_type")]
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(default)]
    pub executed_amount_base: Decimal,
    #[serde(default)]
    pub executed_amount_quote: Decimal,
    #[serde(default)]
    pub fee_asset: Option<String>,
    #[serde(default)]
    pub fee_paid: Decimal,
    pub last_state: OrderState,
    #[serde(default)]
    pub creation_timestamp: u64,
    /// Trade ids already applied, so a restart does not re-count old fills.
    #[serde(default)]
    pub trade_ids: Vec<String>,
}

impl From<&InFlightOrder> for OrderSnapshot {
    fn from(order: &InFlightOrder) -> Self {
        let mut trade_ids: Vec<String> = order.trade_ids.iter().cloned().collect();
        trade_ids.sort();
        Self {
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            trading_pair: order.trading_pair.clone(),
            order_type: order.order_type,
            side: order.side,
            price: order.price,
            amount: order.amount,
            executed_amount_base: order.executed_amount_base,
            executed_amount_quote: order.executed_amount_quote,
            fee_asset: order.fee_asset.clone(),
            fee_paid: order.fee_paid,
            last_state: order.last_state,
            creation_timestamp: order.creation_timestamp,
            trade_ids,
        }
    }
}

impl OrderSnapshot {
    /// Rebuild the live order record.
    pub fn to_in_flight(&self) -> InFlightOrder {
        let mut order = InFlightOrder::new(
            self.client_order_id.clone(),
            self.trading_pair.clone(),
            self.side,
            self.order_type,
            self.price,
            self.amount,
            self.creation_timestamp,
        );
        order.exchange_order_id = self.exchange_order_id.clone();
        order.executed_amount_base = self.executed_amount_base;
        order.executed_amount_quote = self.executed_amount_quote;
        order.fee_asset = self.fee_asset.clone();
        order.fee_paid = self.fee_paid;
        order.last_state = self.last_state;
        order.trade_ids = self.trade_ids.iter().cloned().collect();
        // A restored order past PendingCreate was already announced.
        order.created_published = self.last_state != OrderState::PendingCreate;
        order
    }
}

/// `client_order_id -> OrderSnapshot`, ordered for stable output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingSnapshot {
    pub orders: BTreeMap<String, OrderSnapshot>,
}

impl TrackingSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: OrderSnapshot) {
        self.orders.insert(snapshot.client_order_id.clone(), snapshot);
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl FromIterator<OrderSnapshot> for TrackingSnapshot {
    fn from_iter<I: IntoIterator<Item = OrderSnapshot>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for order in iter {
            snapshot.insert(order);
        }
        snapshot
    }
}
