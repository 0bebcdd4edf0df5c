//! Order lifecycle events published to the strategy layer.

use crate::in_flight::InFlightOrder;
use crate::order::{OrderSide, OrderType};
use crate::update::TradeUpdate;
use rust_decimal::Decimal;
use serde::Serialize;

// ============================================================================
// Event payloads
// ============================================================================

/// The exchange acknowledged the order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderCreatedEvent {
    pub timestamp: u64,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    pub creation_timestamp: u64,
}

/// One fill was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderFilledEvent {
    pub timestamp: u64,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub fill_price: Decimal,
    pub fill_base_amount: Decimal,
    pub fill_quote_amount: Decimal,
    pub fee_asset: Option<String>,
    pub fee_amount: Decimal,
    pub trade_id: String,
}

/// The order was canceled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderCancelledEvent {
    pub timestamp: u64,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
}

/// The order was rejected at creation or declared lost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderFailureEvent {
    pub timestamp: u64,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub order_type: OrderType,
    pub reason: Option<String>,
}

/// The order expired on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderExpiredEvent {
    pub timestamp: u64,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
}

/// The order is fully filled. Carries the accumulated totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderCompletedEvent {
    pub timestamp: u64,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub order_type: OrderType,
    pub executed_amount_base: Decimal,
    pub executed_amount_quote: Decimal,
    pub fee_asset: Option<String>,
    pub fee_paid: Decimal,
}

// ============================================================================
// Event enum
// ============================================================================

/// Every event a connector publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum ConnectorEvent {
    OrderCreated(OrderCreatedEvent),
    OrderFilled(OrderFilledEvent),
    OrderCancelled(OrderCancelledEvent),
    OrderFailure(OrderFailureEvent),
    OrderExpired(OrderExpiredEvent),
    BuyOrderCompleted(OrderCompletedEvent),
    SellOrderCompleted(OrderCompletedEvent),
}

impl ConnectorEvent {
    pub fn client_order_id(&self) -> &str {
        match self {
            Self::OrderCreated(e) => &e.client_order_id,
            Self::OrderFilled(e) => &e.client_order_id,
            Self::OrderCancelled(e) => &e.client_order_id,
            Self::OrderFailure(e) => &e.client_order_id,
            Self::OrderExpired(e) => &e.client_order_id,
            Self::BuyOrderCompleted(e) | Self::SellOrderCompleted(e) => &e.client_order_id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Self::OrderCreated(e) => e.timestamp,
            Self::OrderFilled(e) => e.timestamp,
            Self::OrderCancelled(e) => e.timestamp,
            Self::OrderFailure(e) => e.timestamp,
            Self::OrderExpired(e) => e.timestamp,
            Self::BuyOrderCompleted(e) | Self::SellOrderCompleted(e) => e.timestamp,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderCreated(_) => "OrderCreated",
            Self::OrderFilled(_) => "OrderFilled",
            Self::OrderCancelled(_) => "OrderCancelled",
            Self::OrderFailure(_) => "OrderFailure",
            Self::OrderExpired(_) => "OrderExpired",
            Self::BuyOrderCompleted(_) => "BuyOrderCompleted",
            Self::SellOrderCompleted(_) => "SellOrderCompleted",
        }
    }

    /// Whether this event ends the order's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::OrderCreated(_) | Self::OrderFilled(_))
    }

    pub(crate) fn created(order: &InFlightOrder, timestamp: u64) -> Self {
        Self::OrderCreated(OrderCreatedEvent {
            timestamp,
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            trading_pair: order.trading_pair.clone(),
            side: order.side,
            order_type: order.order_type,
            price: order.price,
            amount: order.amount,
            creation_timestamp: order.creation_timestamp,
        })
    }

    pub(crate) fn filled(order: &InFlightOrder, trade: &TradeUpdate) -> Self {
        Self::OrderFilled(OrderFilledEvent {
            timestamp: trade.fill_timestamp,
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            trading_pair: order.trading_pair.clone(),
            side: order.side,
            order_type: order.order_type,
            fill_price: trade.fill_price,
            fill_base_amount: trade.fill_base_amount,
            fill_quote_amount: trade.fill_quote_amount,
            fee_asset: trade.fee_asset.clone(),
            fee_amount: trade.fee_amount,
            trade_id: trade.trade_id.clone(),
        })
    }

    pub(crate) fn cancelled(order: &InFlightOrder, timestamp: u64) -> Self {
        Self::OrderCancelled(OrderCancelledEvent {
            timestamp,
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            trading_pair: order.trading_pair.clone(),
        })
    }

    pub(crate) fn failure(order: &InFlightOrder, timestamp: u64, reason: Option<String>) -> Self {
        Self::OrderFailure(OrderFailureEvent {
            timestamp,
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            trading_pair: order.trading_pair.clone(),
            order_type: order.order_type,
            reason,
        })
    }

    pub(crate) fn expired(order: &InFlightOrder, timestamp: u64) -> Self {
        Self::OrderExpired(OrderExpiredEvent {
            timestamp,
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            trading_pair: order.trading_pair.clone(),
        })
    }

    pub(crate) fn completed(order: &InFlightOrder, timestamp: u64) -> Self {
        let payload = OrderCompletedEvent {
            timestamp,
            client_order_id: order.client_order_id.clone(),
            exchange_order_id: order.exchange_order_id.clone(),
            trading_pair: order.trading_pair.clone(),
            base_asset: order.base_asset().to_string(),
            quote_asset: order.quote_asset().to_string(),
            order_type: order.order_type,
            executed_amount_base: order.executed_amount_base,
            executed_amount_quote: order.executed_amount_quote,
            fee_asset: order.fee_asset.clone(),
            fee_paid: order.fee_paid,
        };
        match order.side {
            OrderSide::Buy => Self::BuyOrderCompleted(payload),
            OrderSide::Sell => Self::SellOrderCompleted(payload),
        }
    }
}
