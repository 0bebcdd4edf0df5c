//! A single order whose final outcome is not yet known.

use crate::order::{OrderSide, OrderState, OrderType};
use crate::update::TradeUpdate;
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Relative tolerance used when comparing executed and ordered amounts.
pub const FILL_RELATIVE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 9);

/// `|a - b| <= rel_tol * max(|a|, |b|)`.
pub fn is_close(a: Decimal, b: Decimal) -> bool {
    let diff = (a - b).abs();
    diff <= FILL_RELATIVE_TOLERANCE * a.abs().max(b.abs())
}

/// Result of offering an exchange order id to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeIdAssignment {
    /// The order had no id; it now has this one.
    Assigned,
    /// The order already carried this exact id.
    Unchanged,
    /// The order already carries a different id; the offer was ignored.
    Conflict,
}

/// Result of applying a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeApplication {
    /// The fill was accumulated.
    Applied,
    /// The trade id was seen before.
    Duplicate,
    /// The fill belongs to a different exchange order.
    ExchangeIdMismatch,
}

/// Mutable record of one tracked order.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlightOrder {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub trading_pair: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    pub executed_amount_base: Decimal,
    pub executed_amount_quote: Decimal,
    pub fee_asset: Option<String>,
    pub fee_paid: Decimal,
    pub last_state: OrderState,
    pub trade_ids: HashSet<String>,
    pub creation_timestamp: u64,
    pub last_update_timestamp: u64,
    pub last_filled_price: Option<Decimal>,
    pub last_filled_amount: Option<Decimal>,
    pub last_fee_paid: Option<Decimal>,
    pub last_trade_id: Option<String>,
    pub(crate) created_published: bool,
    pub(crate) completion_published: bool,
}

impl InFlightOrder {
    /// Create an order in `PendingCreate`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_order_id: impl Into<String>,
        trading_pair: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        price: Decimal,
        amount: Decimal,
        creation_timestamp: u64,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            exchange_order_id: None,
            trading_pair: trading_pair.into(),
            side,
            order_type,
            price,
            amount,
            executed_amount_base: Decimal::ZERO,
            executed_amount_quote: Decimal::ZERO,
            fee_asset: None,
            fee_paid: Decimal::ZERO,
            last_state: OrderState::PendingCreate,
            trade_ids: HashSet::new(),
            creation_timestamp,
            last_update_timestamp: creation_timestamp,
            last_filled_price: None,
            last_filled_amount: None,
            last_fee_paid: None,
            last_trade_id: None,
            created_published: false,
            completion_published: false,
        }
    }

    /// Base asset, assuming `BASE-QUOTE` pair naming.
    pub fn base_asset(&self) -> &str {
        self.trading_pair
            .split_once('-')
            .map_or(self.trading_pair.as_str(), |(base, _)| base)
    }

    /// Quote asset, assuming `BASE-QUOTE` pair naming.
    pub fn quote_asset(&self) -> &str {
        self.trading_pair
            .split_once('-')
            .map_or("", |(_, quote)| quote)
    }

    pub fn is_pending_create(&self) -> bool {
        self.last_state == OrderState::PendingCreate
    }

    pub fn is_open(&self) -> bool {
        self.last_state.is_open()
    }

    pub fn is_done(&self) -> bool {
        self.last_state.is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.last_state == OrderState::Canceled
    }

    pub fn is_failure(&self) -> bool {
        self.last_state == OrderState::Failed
    }

    /// Completion predicate.
    ///
    /// True when the state says so, or when the executed amount is close to
    /// the ordered amount, or when it has reached or passed it.
    pub fn is_filled(&self) -> bool {
        self.last_state == OrderState::Filled
            || (!self.amount.is_zero()
                && (is_close(self.executed_amount_base, self.amount)
                    || self.executed_amount_base >= self.amount))
    }

    pub fn remaining_amount(&self) -> Decimal {
        (self.amount - self.executed_amount_base).max(Decimal::ZERO)
    }

    /// Volume-weighted fill price, `None` before the first fill.
    pub fn average_executed_price(&self) -> Option<Decimal> {
        if self.executed_amount_base.is_zero() {
            None
        } else {
            Some(self.executed_amount_quote / self.executed_amount_base)
        }
    }

    /// Offer an exchange order id. An id, once set, never changes.
    pub fn assign_exchange_order_id(&mut self, exchange_order_id: &str) -> ExchangeIdAssignment {
        match &self.exchange_order_id {
            None => {
                self.exchange_order_id = Some(exchange_order_id.to_string());
                ExchangeIdAssignment::Assigned
            }
            Some(current) if current == exchange_order_id => ExchangeIdAssignment::Unchanged,
            Some(_) => ExchangeIdAssignment::Conflict,
        }
    }

    /// Move to `new_state` if it is forward progress. Returns whether the state changed.
    pub fn advance_state(&mut self, new_state: OrderState, timestamp: u64) -> bool {
        if !self.last_state.can_transition_to(new_state) {
            return false;
        }
        self.last_state = new_state;
        self.last_update_timestamp = self.last_update_timestamp.max(timestamp);
        true
    }

    /// True once fills have pushed the executed amount past the order amount.
    pub fn is_overfilled(&self) -> bool {
        self.executed_amount_base > self.amount && !is_close(self.executed_amount_base, self.amount)
    }

    /// Accumulate a fill. Does not touch `last_state`.
    ///
    /// A fill past the order amount is still accumulated; the exchange's
    /// accounting wins.
    pub fn apply_trade(&mut self, trade: &TradeUpdate) -> TradeApplication {
        if self.trade_ids.contains(&trade.trade_id) {
            return TradeApplication::Duplicate;
        }
        if let (Some(ours), Some(theirs)) = (&self.exchange_order_id, &trade.exchange_order_id) {
            if ours != theirs {
                return TradeApplication::ExchangeIdMismatch;
            }
        }

        self.trade_ids.insert(trade.trade_id.clone());
        self.executed_amount_base += trade.fill_base_amount;
        self.executed_amount_quote += trade.fill_quote_amount;
        self.fee_paid += trade.fee_amount;
        if self.fee_asset.is_none() {
            self.fee_asset = trade.fee_asset.clone();
        }
        self.last_filled_price = Some(trade.fill_price);
        self.last_filled_amount = Some(trade.fill_base_amount);
        self.last_fee_paid = Some(trade.fee_amount);
        self.last_trade_id = Some(trade.trade_id.clone());
        self.last_update_timestamp = self.last_update_timestamp.max(trade.fill_timestamp);
        if self.exchange_order_id.is_none() {
            self.exchange_order_id = trade.exchange_order_id.clone();
        }
        TradeApplication::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(amount: Decimal) -> InFlightOrder {
        InFlightOrder::new(
            "c1",
            "BTC-USDT",
            OrderSide::Buy,
            OrderType::Limit,
            dec!(100),
            amount,
            1_000,
        )
    }

    fn trade(id: &str, base: Decimal) -> TradeUpdate {
        TradeUpdate {
            trade_id: id.into(),
            client_order_id: Some("c1".into()),
            exchange_order_id: Some("e1".into()),
            trading_pair: "BTC-USDT".into(),
            fill_base_amount: base,
            fill_quote_amount: base * dec!(100),
            fill_price: dec!(100),
            fee_asset: Some("USDT".into()),
            fee_amount: dec!(0.1),
            fill_timestamp: 2_000,
        }
    }

    #[test]
    fn test_is_close() {
        assert!(is_close(dec!(1), dec!(1)));
        assert!(is_close(dec!(1), dec!(1.0000000001)));
        assert!(!is_close(dec!(1), dec!(1.00001)));
        assert!(is_close(dec!(0), dec!(0)));
    }

    #[test]
    fn test_assets() {
        let o = order(dec!(1));
        assert_eq!(o.base_asset(), "BTC");
        assert_eq!(o.quote_asset(), "USDT");
    }

    #[test]
    fn test_is_filled_both_disjuncts() {
        let mut o = order(dec!(1));
        assert!(!o.is_filled());

        // Within tolerance but below the amount.
        o.executed_amount_base = dec!(0.9999999999);
        assert!(o.is_filled());

        o.executed_amount_base = dec!(1);
        assert!(o.is_filled());

        o.executed_amount_base = dec!(0.5);
        assert!(!o.is_filled());
        o.last_state = OrderState::Filled;
        assert!(o.is_filled());
    }

    #[test]
    fn test_zero_amount_never_filled_by_amount() {
        let o = order(dec!(0));
        assert!(!o.is_filled());
    }

    #[test]
    fn test_apply_trade_accumulates() {
        let mut o = order(dec!(1));
        assert_eq!(o.apply_trade(&trade("t1", dec!(0.4))), TradeApplication::Applied);
        assert_eq!(o.apply_trade(&trade("t2", dec!(0.6))), TradeApplication::Applied);

        assert_eq!(o.executed_amount_base, dec!(1.0));
        assert_eq!(o.executed_amount_quote, dec!(100.0));
        assert_eq!(o.fee_paid, dec!(0.2));
        assert_eq!(o.fee_asset.as_deref(), Some("USDT"));
        assert_eq!(o.average_executed_price(), Some(dec!(100)));
        assert_eq!(o.exchange_order_id.as_deref(), Some("e1"));
        assert_eq!(o.last_trade_id.as_deref(), Some("t2"));
        assert_eq!(o.last_update_timestamp, 2_000);
    }

    #[test]
    fn test_apply_trade_duplicate() {
        let mut o = order(dec!(1));
        o.apply_trade(&trade("t1", dec!(0.4)));
        assert_eq!(o.apply_trade(&trade("t1", dec!(0.4))), TradeApplication::Duplicate);
        assert_eq!(o.executed_amount_base, dec!(0.4));
    }

    #[test]
    fn test_apply_trade_mismatched_exchange_id() {
        let mut o = order(dec!(1));
        o.assign_exchange_order_id("other");
        assert_eq!(
            o.apply_trade(&trade("t1", dec!(0.4))),
            TradeApplication::ExchangeIdMismatch
        );
        assert!(o.executed_amount_base.is_zero());
    }

    #[test]
    fn test_apply_trade_past_amount_is_accumulated() {
        let mut o = order(dec!(1));
        o.apply_trade(&trade("t1", dec!(0.8)));
        assert!(!o.is_filled());
        assert_eq!(o.apply_trade(&trade("t2", dec!(0.3))), TradeApplication::Applied);
        assert_eq!(o.executed_amount_base, dec!(1.1));
        assert_eq!(o.fee_paid, dec!(0.2));
        assert!(o.trade_ids.contains("t2"));
        assert!(o.is_overfilled());
        assert!(o.is_filled());
    }

    #[test]
    fn test_exchange_id_assigned_once() {
        let mut o = order(dec!(1));
        assert_eq!(o.assign_exchange_order_id("e1"), ExchangeIdAssignment::Assigned);
        assert_eq!(o.assign_exchange_order_id("e1"), ExchangeIdAssignment::Unchanged);
        assert_eq!(o.assign_exchange_order_id("e2"), ExchangeIdAssignment::Conflict);
        assert_eq!(o.exchange_order_id.as_deref(), Some("e1"));
    }

    #[test]
    fn test_advance_state_forward_only() {
        let mut o = order(dec!(1));
        assert!(o.advance_state(OrderState::Open, 5));
        assert!(!o.advance_state(OrderState::PendingCreate, 6));
        assert!(o.advance_state(OrderState::Canceled, 7));
        assert!(!o.advance_state(OrderState::Filled, 8));
        assert_eq!(o.last_state, OrderState::Canceled);
        assert_eq!(o.last_update_timestamp, 7);
    }
}
