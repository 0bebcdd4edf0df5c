//! Per-pair order constraints published by the exchange.

use crate::order::OrderType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Constraints an order must satisfy before it is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRule {
    pub trading_pair: String,
    #[serde(default)]
    pub min_order_size: Decimal,
    #[serde(default)]
    pub min_notional_size: Decimal,
    #[serde(default)]
    pub min_price_increment: Decimal,
    #[serde(default)]
    pub min_base_amount_increment: Decimal,
    #[serde(default = "default_true")]
    pub supports_limit_orders: bool,
    #[serde(default = "default_true")]
    pub supports_market_orders: bool,
}

fn default_true() -> bool {
    true
}

/// Why an order was refused before submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    #[error("{order_type} orders are not supported on {trading_pair}")]
    UnsupportedOrderType {
        order_type: OrderType,
        trading_pair: String,
    },
    #[error("amount {amount} is below the minimum order size {min}")]
    BelowMinSize { amount: Decimal, min: Decimal },
    #[error("notional {notional} is below the minimum notional {min}")]
    BelowMinNotional { notional: Decimal, min: Decimal },
}

impl TradingRule {
    /// Rule with no constraints.
    pub fn unrestricted(trading_pair: impl Into<String>) -> Self {
        Self {
            trading_pair: trading_pair.into(),
            min_order_size: Decimal::ZERO,
            min_notional_size: Decimal::ZERO,
            min_price_increment: Decimal::ZERO,
            min_base_amount_increment: Decimal::ZERO,
            supports_limit_orders: true,
            supports_market_orders: true,
        }
    }

    pub fn supports(&self, order_type: OrderType) -> bool {
        if order_type.is_limit_type() {
            self.supports_limit_orders
        } else {
            self.supports_market_orders
        }
    }

    /// Round a price down to the price increment.
    pub fn quantize_price(&self, price: Decimal) -> Decimal {
        quantize_down(price, self.min_price_increment)
    }

    /// Round an amount down to the base amount increment.
    pub fn quantize_amount(&self, amount: Decimal) -> Decimal {
        quantize_down(amount, self.min_base_amount_increment)
    }

    /// Check an already-quantized order.
    ///
    /// `price` is the limit price, or a reference price for market orders
    /// (zero skips the notional check).
    pub fn validate(
        &self,
        order_type: OrderType,
        amount: Decimal,
        price: Decimal,
    ) -> Result<(), RuleViolation> {
        if !self.supports(order_type) {
            return Err(RuleViolation::UnsupportedOrderType {
                order_type,
                trading_pair: self.trading_pair.clone(),
            });
        }
        if amount < self.min_order_size || amount.is_zero() {
            return Err(RuleViolation::BelowMinSize {
                amount,
                min: self.min_order_size,
            });
        }
        let notional = amount * price;
        if !price.is_zero() && notional < self.min_notional_size {
            return Err(RuleViolation::BelowMinNotional {
                notional,
                min: self.min_notional_size,
            });
        }
        Ok(())
    }
}

fn quantize_down(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).floor() * step).normalize()
}
