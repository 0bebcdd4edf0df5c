//! The order state machine.
//!
//! [`InFlightOrderTracker`] is the single owner of every [`InFlightOrder`]. It
//! performs no I/O: both reconciliation channels feed it updates, and it
//! decides what changed and which events to publish. Every entry point is
//! idempotent under duplicate or out-of-order delivery, so it does not matter
//! which channel reports a change first.
//!
//! # Lifecycle
//!
//! 1. `start_tracking_order` registers the order in `PendingCreate` before the
//!    submission call is made
//! 2. order updates (translated through the exchange's [`StatusTable`]) and
//!    trade updates move it forward
//! 3. on a terminal state the matching event is published and the order moves
//!    to a short-lived cache of recently finished orders, where late fills can
//!    still be attributed

use crate::event_bus::EventBus;
use crate::events::ConnectorEvent;
use crate::in_flight::{ExchangeIdAssignment, InFlightOrder, TradeApplication};
use crate::order::OrderState;
use crate::snapshot::{OrderSnapshot, TrackingSnapshot};
use crate::status::StatusTable;
use crate::update::{OrderStateUpdate, OrderUpdate, TradeUpdate};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Reason attached to failures raised by repeated not-found lookups.
pub const ORDER_NOT_FOUND_REASON: &str = "order not found on exchange";

/// Tracker tuning.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How long finished orders stay available for late updates.
    pub cached_order_ttl: Duration,
    /// Maximum number of finished orders kept.
    pub cached_order_capacity: usize,
    /// Not-found reports tolerated before an order is declared failed.
    pub order_not_found_limit: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cached_order_ttl: Duration::from_secs(30),
            cached_order_capacity: 1000,
            order_not_found_limit: 3,
        }
    }
}

/// Result of an order status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The order moved to this state.
    Transitioned(OrderState),
    /// Nothing new (same or backward state, or the order already finished).
    NoChange,
    /// No tracked or recently finished order matches the ids.
    UnknownOrder,
}

/// Result of a trade update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    /// Fill applied to an active order; `completed` when it finished the order.
    Applied { completed: bool },
    /// Fill applied to a recently finished order.
    LateFill,
    /// Trade id seen before.
    Duplicate,
    /// Fill ignored: it names a different exchange order.
    Rejected,
    /// No tracked or recently finished order matches.
    UnknownOrder,
}

/// Result of a not-found report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundOutcome {
    /// Counted; the order stays tracked. Holds the count so far.
    Counted(u32),
    /// Limit exceeded; the order was failed and untracked.
    Failed,
    /// The order is not tracked.
    NotTracked,
}

/// A status token the exchange table does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized order status '{token}' for order {order_ref}")]
pub struct UnknownStatusError {
    pub token: String,
    pub order_ref: String,
}

struct CachedOrder {
    order: InFlightOrder,
    stopped_at: Instant,
}

/// Owner of every in-flight order of one connector.
pub struct InFlightOrderTracker {
    in_flight: HashMap<String, InFlightOrder>,
    cached: HashMap<String, CachedOrder>,
    cached_order: VecDeque<String>,
    not_found: HashMap<String, u32>,
    status_table: StatusTable,
    event_bus: EventBus,
    config: TrackerConfig,
}

impl InFlightOrderTracker {
    pub fn new(status_table: StatusTable, event_bus: EventBus, config: TrackerConfig) -> Self {
        Self {
            in_flight: HashMap::new(),
            cached: HashMap::new(),
            cached_order: VecDeque::new(),
            not_found: HashMap::new(),
            status_table,
            event_bus,
            config,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn status_table(&self) -> &StatusTable {
        &self.status_table
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a new order. Returns false (and changes nothing) if the id is
    /// already tracked.
    pub fn start_tracking_order(&mut self, order: InFlightOrder) -> bool {
        if self.in_flight.contains_key(&order.client_order_id) {
            debug!(client_order_id = %order.client_order_id, "Order already tracked");
            return false;
        }
        debug!(
            client_order_id = %order.client_order_id,
            trading_pair = %order.trading_pair,
            side = %order.side,
            amount = %order.amount,
            "Tracking order"
        );
        self.in_flight.insert(order.client_order_id.clone(), order);
        true
    }

    /// Stop tracking an order. No-op if it is not tracked.
    ///
    /// The removed order is kept briefly so late updates can still find it.
    pub fn stop_tracking_order(&mut self, client_order_id: &str) -> Option<InFlightOrder> {
        let order = self.in_flight.remove(client_order_id)?;
        self.not_found.remove(client_order_id);
        self.cache_order(order.clone());
        Some(order)
    }

    /// Re-register persisted orders that had not finished.
    ///
    /// Orders in a terminal state are dropped. Orders already tracked are left
    /// alone. Returns how many orders were registered.
    pub fn restore_tracking_states(&mut self, snapshot: &TrackingSnapshot) -> usize {
        let mut restored = 0;
        for (client_order_id, saved) in &snapshot.orders {
            if saved.last_state.is_terminal() {
                debug!(%client_order_id, state = %saved.last_state, "Skipping finished order");
                continue;
            }
            if self.start_tracking_order(saved.to_in_flight()) {
                restored += 1;
            }
        }
        info!(restored, total = snapshot.len(), "Restored tracking states");
        restored
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn fetch_tracked_order(&self, client_order_id: &str) -> Option<&InFlightOrder> {
        self.in_flight.get(client_order_id)
    }

    pub fn fetch_cached_order(&self, client_order_id: &str) -> Option<&InFlightOrder> {
        self.cached.get(client_order_id).map(|c| &c.order)
    }

    /// Find an active or recently finished order by either id.
    pub fn fetch_order(
        &self,
        client_order_id: Option<&str>,
        exchange_order_id: Option<&str>,
    ) -> Option<&InFlightOrder> {
        if let Some(id) = self.resolve_active(client_order_id, exchange_order_id) {
            return self.in_flight.get(&id);
        }
        self.resolve_cached(client_order_id, exchange_order_id)
            .and_then(|id| self.fetch_cached_order(&id))
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &InFlightOrder> {
        self.in_flight.values()
    }

    /// Active orders plus recently finished ones (late fills may still arrive).
    pub fn all_fillable_orders(&self) -> impl Iterator<Item = &InFlightOrder> {
        self.in_flight
            .values()
            .chain(self.cached.values().map(|c| &c.order))
    }

    pub fn is_tracking(&self, client_order_id: &str) -> bool {
        self.in_flight.contains_key(client_order_id)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn cached_len(&self) -> usize {
        self.cached.len()
    }

    /// Serializable view of every unfinished tracked order.
    pub fn tracking_snapshot(&self) -> TrackingSnapshot {
        self.in_flight
            .values()
            .filter(|o| !o.is_done())
            .map(OrderSnapshot::from)
            .collect()
    }

    fn resolve_active(
        &self,
        client_order_id: Option<&str>,
        exchange_order_id: Option<&str>,
    ) -> Option<String> {
        if let Some(id) = client_order_id {
            if self.in_flight.contains_key(id) {
                return Some(id.to_string());
            }
        }
        let eid = exchange_order_id?;
        self.in_flight
            .values()
            .find(|o| o.exchange_order_id.as_deref() == Some(eid))
            .map(|o| o.client_order_id.clone())
    }

    fn resolve_cached(
        &self,
        client_order_id: Option<&str>,
        exchange_order_id: Option<&str>,
    ) -> Option<String> {
        if let Some(id) = client_order_id {
            if self.cached.contains_key(id) {
                return Some(id.to_string());
            }
        }
        let eid = exchange_order_id?;
        self.cached
            .values()
            .find(|c| c.order.exchange_order_id.as_deref() == Some(eid))
            .map(|c| c.order.client_order_id.clone())
    }

    // ========================================================================
    // Order status updates
    // ========================================================================

    /// Apply an exchange status report.
    ///
    /// # Errors
    /// Returns [`UnknownStatusError`] if the token is not in the status table;
    /// the record is not applied.
    pub fn process_order_update(
        &mut self,
        update: &OrderUpdate,
    ) -> Result<UpdateOutcome, UnknownStatusError> {
        let new_state = self.status_table.translate(&update.status).ok_or_else(|| {
            UnknownStatusError {
                token: update.status.clone(),
                order_ref: update
                    .client_order_id
                    .clone()
                    .or_else(|| update.exchange_order_id.clone())
                    .unwrap_or_else(|| "<none>".to_string()),
            }
        })?;

        Ok(self.process_state_update(&OrderStateUpdate {
            client_order_id: update.client_order_id.clone(),
            exchange_order_id: update.exchange_order_id.clone(),
            trading_pair: update.trading_pair.clone(),
            new_state,
            update_timestamp: update.update_timestamp,
            reason: update.reason.clone(),
        }))
    }

    /// Apply a status report already expressed as an [`OrderState`].
    pub fn process_state_update(&mut self, update: &OrderStateUpdate) -> UpdateOutcome {
        self.prune_cache();

        let client_id = update.client_order_id.as_deref();
        let exchange_id = update.exchange_order_id.as_deref();

        let Some(id) = self.resolve_active(client_id, exchange_id) else {
            if self.resolve_cached(client_id, exchange_id).is_some() {
                debug!(
                    client_order_id = ?client_id,
                    exchange_order_id = ?exchange_id,
                    state = %update.new_state,
                    "Status update for finished order ignored"
                );
                return UpdateOutcome::NoChange;
            }
            debug!(
                client_order_id = ?client_id,
                exchange_order_id = ?exchange_id,
                "Status update for untracked order"
            );
            return UpdateOutcome::UnknownOrder;
        };

        let Some(order) = self.in_flight.get_mut(&id) else {
            return UpdateOutcome::UnknownOrder;
        };

        if let Some(eid) = exchange_id {
            if order.assign_exchange_order_id(eid) == ExchangeIdAssignment::Conflict {
                warn!(
                    client_order_id = %id,
                    current = ?order.exchange_order_id,
                    reported = %eid,
                    "Conflicting exchange order id, update ignored"
                );
                return UpdateOutcome::NoChange;
            }
        }

        let previous = order.last_state;
        if !order.advance_state(update.new_state, update.update_timestamp) {
            return UpdateOutcome::NoChange;
        }

        let timestamp = update.update_timestamp;
        let mut events = Vec::with_capacity(2);

        if previous == OrderState::PendingCreate
            && !matches!(update.new_state, OrderState::Canceled | OrderState::Failed)
            && !order.created_published
        {
            order.created_published = true;
            info!(
                client_order_id = %id,
                exchange_order_id = ?order.exchange_order_id,
                trading_pair = %order.trading_pair,
                "Order created"
            );
            events.push(ConnectorEvent::created(order, timestamp));
        }

        let stop = match update.new_state {
            OrderState::Canceled => {
                info!(client_order_id = %id, "Order cancelled");
                events.push(ConnectorEvent::cancelled(order, timestamp));
                true
            }
            OrderState::Failed => {
                warn!(client_order_id = %id, reason = ?update.reason, "Order failed");
                events.push(ConnectorEvent::failure(order, timestamp, update.reason.clone()));
                true
            }
            OrderState::Expired => {
                info!(client_order_id = %id, "Order expired");
                events.push(ConnectorEvent::expired(order, timestamp));
                true
            }
            OrderState::Filled => {
                if !order.completion_published {
                    order.completion_published = true;
                    info!(
                        client_order_id = %id,
                        executed = %order.executed_amount_base,
                        amount = %order.amount,
                        "Order completely filled"
                    );
                    events.push(ConnectorEvent::completed(order, timestamp));
                }
                true
            }
            OrderState::PendingCreate | OrderState::Open | OrderState::PartiallyFilled => false,
        };

        for event in events {
            self.event_bus.publish(event);
        }
        if stop {
            self.stop_tracking_order(&id);
        }

        UpdateOutcome::Transitioned(update.new_state)
    }

    // ========================================================================
    // Trade updates
    // ========================================================================

    /// Apply one fill.
    ///
    /// Duplicate trade ids are discarded. The order completes the first time
    /// the completion predicate holds.
    pub fn process_trade_update(&mut self, trade: &TradeUpdate) -> TradeOutcome {
        self.prune_cache();

        let client_id = trade.client_order_id.as_deref();
        let exchange_id = trade.exchange_order_id.as_deref();

        if let Some(id) = self.resolve_active(client_id, exchange_id) {
            return self.apply_trade_to_active(&id, trade);
        }

        if let Some(id) = self.resolve_cached(client_id, exchange_id) {
            return self.apply_trade_to_cached(&id, trade);
        }

        debug!(
            trade_id = %trade.trade_id,
            client_order_id = ?client_id,
            exchange_order_id = ?exchange_id,
            "Trade for untracked order"
        );
        TradeOutcome::UnknownOrder
    }

    fn apply_trade_to_active(&mut self, id: &str, trade: &TradeUpdate) -> TradeOutcome {
        let Some(order) = self.in_flight.get_mut(id) else {
            return TradeOutcome::UnknownOrder;
        };

        match order.apply_trade(trade) {
            TradeApplication::Applied => {}
            TradeApplication::Duplicate => {
                debug!(client_order_id = %id, trade_id = %trade.trade_id, "Duplicate trade ignored");
                return TradeOutcome::Duplicate;
            }
            TradeApplication::ExchangeIdMismatch => {
                warn!(
                    client_order_id = %id,
                    trade_id = %trade.trade_id,
                    expected = ?order.exchange_order_id,
                    reported = ?trade.exchange_order_id,
                    "Trade names a different exchange order, ignored"
                );
                return TradeOutcome::Rejected;
            }
        }

        if order.is_overfilled() {
            warn!(
                client_order_id = %id,
                trade_id = %trade.trade_id,
                executed = %order.executed_amount_base,
                amount = %order.amount,
                "Fills exceed order amount"
            );
        }

        let timestamp = trade.fill_timestamp;
        let mut events = Vec::with_capacity(3);

        // A fill is proof the exchange accepted the order.
        if order.is_pending_create() && !order.created_published {
            order.created_published = true;
            events.push(ConnectorEvent::created(order, timestamp));
        }

        info!(
            client_order_id = %id,
            trade_id = %trade.trade_id,
            fill_base = %trade.fill_base_amount,
            fill_price = %trade.fill_price,
            executed = %order.executed_amount_base,
            amount = %order.amount,
            "Order filled"
        );
        events.push(ConnectorEvent::filled(order, trade));

        let completed = order.is_filled() && !order.completion_published;
        if completed {
            order.advance_state(OrderState::Filled, timestamp);
            order.completion_published = true;
            info!(client_order_id = %id, "Order completely filled");
            events.push(ConnectorEvent::completed(order, timestamp));
        } else {
            order.advance_state(OrderState::PartiallyFilled, timestamp);
        }

        for event in events {
            self.event_bus.publish(event);
        }
        if completed {
            self.stop_tracking_order(id);
        }

        TradeOutcome::Applied { completed }
    }

    fn apply_trade_to_cached(&mut self, id: &str, trade: &TradeUpdate) -> TradeOutcome {
        let Some(cached) = self.cached.get_mut(id) else {
            return TradeOutcome::UnknownOrder;
        };

        match cached.order.apply_trade(trade) {
            TradeApplication::Applied => {
                info!(
                    client_order_id = %id,
                    trade_id = %trade.trade_id,
                    state = %cached.order.last_state,
                    "Late fill on finished order"
                );
                let event = ConnectorEvent::filled(&cached.order, trade);
                self.event_bus.publish(event);
                TradeOutcome::LateFill
            }
            TradeApplication::Duplicate => TradeOutcome::Duplicate,
            TradeApplication::ExchangeIdMismatch => {
                warn!(client_order_id = %id, trade_id = %trade.trade_id, "Late trade ignored");
                TradeOutcome::Rejected
            }
        }
    }

    // ========================================================================
    // Lost orders
    // ========================================================================

    /// Count one "exchange does not know this order" report.
    ///
    /// Once the count exceeds the configured limit the order is marked failed,
    /// `OrderFailure` is published and tracking stops.
    pub fn process_order_not_found(&mut self, client_order_id: &str, timestamp: u64) -> NotFoundOutcome {
        if !self.in_flight.contains_key(client_order_id) {
            return NotFoundOutcome::NotTracked;
        }

        let count = {
            let entry = self.not_found.entry(client_order_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if count <= self.config.order_not_found_limit {
            debug!(%client_order_id, count, "Order not found on exchange");
            return NotFoundOutcome::Counted(count);
        }

        warn!(
            %client_order_id,
            count,
            limit = self.config.order_not_found_limit,
            "Order repeatedly not found, marking failed"
        );
        let update = OrderStateUpdate::for_client_id(
            client_order_id,
            self.in_flight
                .get(client_order_id)
                .map(|o| o.trading_pair.clone())
                .unwrap_or_default(),
            OrderState::Failed,
            timestamp,
        )
        .with_reason(ORDER_NOT_FOUND_REASON);
        self.process_state_update(&update);
        NotFoundOutcome::Failed
    }

    // ========================================================================
    // Recently finished cache
    // ========================================================================

    fn cache_order(&mut self, order: InFlightOrder) {
        let id = order.client_order_id.clone();
        if self.cached.contains_key(&id) {
            self.cached_order.retain(|c| c != &id);
        }
        self.cached.insert(
            id.clone(),
            CachedOrder {
                order,
                stopped_at: Instant::now(),
            },
        );
        self.cached_order.push_back(id);

        while self.cached_order.len() > self.config.cached_order_capacity {
            if let Some(oldest) = self.cached_order.pop_front() {
                self.cached.remove(&oldest);
            }
        }
    }

    fn prune_cache(&mut self) {
        let ttl = self.config.cached_order_ttl;
        while let Some(oldest) = self.cached_order.front() {
            let expired = self
                .cached
                .get(oldest)
                .map_or(true, |c| c.stopped_at.elapsed() >= ttl);
            if !expired {
                break;
            }
            if let Some(id) = self.cached_order.pop_front() {
                self.cached.remove(&id);
            }
        }
    }
}

impl std::fmt::Debug for InFlightOrderTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightOrderTracker")
            .field("in_flight", &self.in_flight.len())
            .field("cached", &self.cached.len())
            .field("status_table", &self.status_table.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderSide, OrderType};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::broadcast::Receiver;

    fn tracker() -> (InFlightOrderTracker, Receiver<ConnectorEvent>) {
        let bus = EventBus::new(64);
        let rx = bus.subscribe();
        (
            InFlightOrderTracker::new(StatusTable::canonical(), bus, TrackerConfig::default()),
            rx,
        )
    }

    fn order(id: &str, side: OrderSide, amount: Decimal) -> InFlightOrder {
        InFlightOrder::new(id, "BTC-USDT", side, OrderType::Limit, dec!(100), amount, 1)
    }

    fn status(id: &str, token: &str, ts: u64) -> OrderUpdate {
        OrderUpdate {
            client_order_id: Some(id.into()),
            exchange_order_id: Some(format!("ex-{}", id)),
            trading_pair: "BTC-USDT".into(),
            status: token.into(),
            update_timestamp: ts,
            reason: None,
        }
    }

    fn fill(id: &str, trade_id: &str, base: Decimal) -> TradeUpdate {
        TradeUpdate {
            trade_id: trade_id.into(),
            client_order_id: Some(id.into()),
            exchange_order_id: Some(format!("ex-{}", id)),
            trading_pair: "BTC-USDT".into(),
            fill_base_amount: base,
            fill_quote_amount: base * dec!(100),
            fill_price: dec!(100),
            fee_asset: Some("USDT".into()),
            fee_amount: dec!(0.01),
            fill_timestamp: 10,
        }
    }

    fn drain(rx: &mut Receiver<ConnectorEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[test]
    fn test_start_tracking_is_idempotent() {
        let (mut t, _rx) = tracker();
        assert!(t.start_tracking_order(order("a", OrderSide::Buy, dec!(1))));

        let mut dup = order("a", OrderSide::Sell, dec!(5));
        dup.price = dec!(1);
        assert!(!t.start_tracking_order(dup));

        assert_eq!(t.len(), 1);
        assert_eq!(t.fetch_tracked_order("a").unwrap().side, OrderSide::Buy);
    }

    #[test]
    fn test_stop_tracking_twice_is_noop() {
        let (mut t, _rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));

        assert!(t.stop_tracking_order("a").is_some());
        assert!(t.stop_tracking_order("a").is_none());
        assert!(t.is_empty());
        assert_eq!(t.cached_len(), 1);
    }

    #[test]
    fn test_open_publishes_created_once() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));

        assert_eq!(
            t.process_order_update(&status("a", "NEW", 2)).unwrap(),
            UpdateOutcome::Transitioned(OrderState::Open)
        );
        assert_eq!(
            t.process_order_update(&status("a", "OPEN", 3)).unwrap(),
            UpdateOutcome::NoChange
        );

        assert_eq!(drain(&mut rx), vec!["OrderCreated"]);
        assert_eq!(
            t.fetch_tracked_order("a").unwrap().exchange_order_id.as_deref(),
            Some("ex-a")
        );
    }

    #[test]
    fn test_cancel_publishes_and_untracks() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));
        t.process_order_update(&status("a", "OPEN", 2)).unwrap();
        t.process_order_update(&status("a", "CANCELLED", 3)).unwrap();

        assert!(!t.is_tracking("a"));
        assert_eq!(drain(&mut rx), vec!["OrderCreated", "OrderCancelled"]);

        // A second report of the same terminal state changes nothing.
        assert_eq!(
            t.process_order_update(&status("a", "CANCELED", 4)).unwrap(),
            UpdateOutcome::NoChange
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_failed_carries_reason() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));

        let mut update = status("a", "REJECTED", 2);
        update.reason = Some("insufficient funds".into());
        t.process_order_update(&update).unwrap();

        match rx.try_recv().unwrap() {
            ConnectorEvent::OrderFailure(e) => {
                assert_eq!(e.reason.as_deref(), Some("insufficient funds"))
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
        assert!(!t.is_tracking("a"));
    }

    #[test]
    fn test_expired_publishes_expired() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));
        t.process_order_update(&status("a", "OPEN", 2)).unwrap();
        t.process_order_update(&status("a", "EXPIRED", 3)).unwrap();
        assert_eq!(drain(&mut rx), vec!["OrderCreated", "OrderExpired"]);
    }

    #[test]
    fn test_unknown_status_token_rejected() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));

        let err = t.process_order_update(&status("a", "HALF_BAKED", 2)).unwrap_err();
        assert_eq!(err.token, "HALF_BAKED");
        assert_eq!(t.fetch_tracked_order("a").unwrap().last_state, OrderState::PendingCreate);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_terminal_state_never_overwritten() {
        let (mut t, _rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));
        t.process_order_update(&status("a", "OPEN", 2)).unwrap();
        t.process_order_update(&status("a", "PARTIALLY_FILLED", 3)).unwrap();
        assert_eq!(
            t.process_order_update(&status("a", "OPEN", 4)).unwrap(),
            UpdateOutcome::NoChange
        );
        assert_eq!(
            t.fetch_tracked_order("a").unwrap().last_state,
            OrderState::PartiallyFilled
        );
    }

    #[test]
    fn test_fills_complete_order_once() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Sell, dec!(1)));
        t.process_order_update(&status("a", "OPEN", 2)).unwrap();

        assert_eq!(
            t.process_trade_update(&fill("a", "t1", dec!(0.4))),
            TradeOutcome::Applied { completed: false }
        );
        assert_eq!(
            t.fetch_tracked_order("a").unwrap().last_state,
            OrderState::PartiallyFilled
        );
        assert_eq!(
            t.process_trade_update(&fill("a", "t2", dec!(0.6))),
            TradeOutcome::Applied { completed: true }
        );

        assert!(!t.is_tracking("a"));
        assert_eq!(
            drain(&mut rx),
            vec!["OrderCreated", "OrderFilled", "OrderFilled", "SellOrderCompleted"]
        );

        // The order-status channel reporting FILLED afterwards adds nothing.
        assert_eq!(
            t.process_order_update(&status("a", "FILLED", 20)).unwrap(),
            UpdateOutcome::NoChange
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_fill_past_amount_completes_order() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));

        assert_eq!(
            t.process_trade_update(&fill("a", "t1", dec!(0.6))),
            TradeOutcome::Applied { completed: false }
        );
        assert_eq!(
            t.process_trade_update(&fill("a", "t2", dec!(0.41))),
            TradeOutcome::Applied { completed: true }
        );
        assert_eq!(
            drain(&mut rx),
            vec!["OrderCreated", "OrderFilled", "OrderFilled", "BuyOrderCompleted"]
        );

        assert!(!t.is_tracking("a"));
        let done = t.fetch_cached_order("a").unwrap();
        assert_eq!(done.last_state, OrderState::Filled);
        assert_eq!(done.executed_amount_base, dec!(1.01));
        assert_eq!(done.fee_paid, dec!(0.02));

        // Polling hands back the same fill: it is a duplicate, not a rejection.
        assert_eq!(t.process_trade_update(&fill("a", "t2", dec!(0.41))), TradeOutcome::Duplicate);
    }

    #[test]
    fn test_duplicate_trade_not_double_counted() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));
        t.process_order_update(&status("a", "OPEN", 2)).unwrap();
        drain(&mut rx);

        t.process_trade_update(&fill("a", "t1", dec!(0.3)));
        assert_eq!(t.process_trade_update(&fill("a", "t1", dec!(0.3))), TradeOutcome::Duplicate);

        assert_eq!(t.fetch_tracked_order("a").unwrap().executed_amount_base, dec!(0.3));
        assert_eq!(drain(&mut rx), vec!["OrderFilled"]);
    }

    #[test]
    fn test_fill_before_ack_publishes_created() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(2)));

        t.process_trade_update(&fill("a", "t1", dec!(1)));
        let o = t.fetch_tracked_order("a").unwrap();
        assert_eq!(o.last_state, OrderState::PartiallyFilled);
        assert_eq!(o.exchange_order_id.as_deref(), Some("ex-a"));

        // Late OPEN from the status channel does not re-announce creation.
        t.process_order_update(&status("a", "OPEN", 11)).unwrap();
        assert_eq!(drain(&mut rx), vec!["OrderCreated", "OrderFilled"]);
    }

    #[test]
    fn test_filled_status_completes_order() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));
        t.process_order_update(&status("a", "OPEN", 2)).unwrap();
        t.process_order_update(&status("a", "FILLED", 3)).unwrap();

        assert!(!t.is_tracking("a"));
        assert_eq!(drain(&mut rx), vec!["OrderCreated", "BuyOrderCompleted"]);
    }

    #[test]
    fn test_late_fill_on_cancelled_order() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));
        t.process_order_update(&status("a", "OPEN", 2)).unwrap();
        t.process_order_update(&status("a", "CANCELED", 3)).unwrap();
        drain(&mut rx);

        assert_eq!(t.process_trade_update(&fill("a", "t9", dec!(0.2))), TradeOutcome::LateFill);
        assert_eq!(t.process_trade_update(&fill("a", "t9", dec!(0.2))), TradeOutcome::Duplicate);
        assert_eq!(drain(&mut rx), vec!["OrderFilled"]);
        assert_eq!(
            t.fetch_order(Some("a"), None).unwrap().executed_amount_base,
            dec!(0.2)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires() {
        let (mut t, _rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));
        t.stop_tracking_order("a");

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(t.process_trade_update(&fill("a", "t1", dec!(0.1))), TradeOutcome::UnknownOrder);
        assert_eq!(t.cached_len(), 0);
    }

    #[test]
    fn test_cache_capacity_bound() {
        let bus = EventBus::new(8);
        let config = TrackerConfig {
            cached_order_capacity: 2,
            ..TrackerConfig::default()
        };
        let mut t = InFlightOrderTracker::new(StatusTable::canonical(), bus, config);
        for id in ["a", "b", "c"] {
            t.start_tracking_order(order(id, OrderSide::Buy, dec!(1)));
            t.stop_tracking_order(id);
        }
        assert_eq!(t.cached_len(), 2);
        assert!(t.fetch_cached_order("a").is_none());
        assert!(t.fetch_cached_order("c").is_some());
    }

    #[test]
    fn test_lookup_by_exchange_id() {
        let (mut t, _rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));
        t.process_order_update(&status("a", "OPEN", 2)).unwrap();

        let update = OrderUpdate {
            client_order_id: None,
            exchange_order_id: Some("ex-a".into()),
            trading_pair: "BTC-USDT".into(),
            status: "CANCELED".into(),
            update_timestamp: 5,
            reason: None,
        };
        assert_eq!(
            t.process_order_update(&update).unwrap(),
            UpdateOutcome::Transitioned(OrderState::Canceled)
        );
        assert!(t.fetch_order(None, Some("ex-a")).unwrap().is_cancelled());
    }

    #[test]
    fn test_conflicting_exchange_id_ignored() {
        let (mut t, _rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));
        t.process_order_update(&status("a", "OPEN", 2)).unwrap();

        let mut update = status("a", "CANCELED", 3);
        update.exchange_order_id = Some("someone-else".into());
        assert_eq!(t.process_order_update(&update).unwrap(), UpdateOutcome::NoChange);
        assert!(t.is_tracking("a"));
    }

    #[test]
    fn test_untracked_update() {
        let (mut t, _rx) = tracker();
        assert_eq!(
            t.process_order_update(&status("zzz", "OPEN", 1)).unwrap(),
            UpdateOutcome::UnknownOrder
        );
        assert_eq!(
            t.process_trade_update(&fill("zzz", "t", dec!(1))),
            TradeOutcome::UnknownOrder
        );
    }

    #[test]
    fn test_not_found_escalates_after_limit() {
        let (mut t, mut rx) = tracker();
        t.start_tracking_order(order("a", OrderSide::Buy, dec!(1)));

        assert_eq!(t.process_order_not_found("a", 1), NotFoundOutcome::Counted(1));
        assert_eq!(t.process_order_not_found("a", 2), NotFoundOutcome::Counted(2));
        assert_eq!(t.process_order_not_found("a", 3), NotFoundOutcome::Counted(3));
        assert_eq!(t.process_order_not_found("a", 4), NotFoundOutcome::Failed);
        assert_eq!(t.process_order_not_found("a", 5), NotFoundOutcome::NotTracked);

        match rx.try_recv().unwrap() {
            ConnectorEvent::OrderFailure(e) => {
                assert_eq!(e.reason.as_deref(), Some(ORDER_NOT_FOUND_REASON))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_and_selective_restore() {
        let (mut t, _rx) = tracker();
        let states = [
            ("open", OrderState::Open),
            ("cancelled", OrderState::Canceled),
            ("filled", OrderState::Filled),
            ("failed", OrderState::Failed),
        ];
        let snapshot: TrackingSnapshot = states
            .iter()
            .map(|(id, state)| {
                let mut o = order(id, OrderSide::Buy, dec!(1));
                o.last_state = *state;
                OrderSnapshot::from(&o)
            })
            .collect();

        assert_eq!(t.restore_tracking_states(&snapshot), 1);
        assert!(t.is_tracking("open"));
        assert_eq!(t.len(), 1);

        let saved = t.tracking_snapshot();
        assert_eq!(saved.len(), 1);
        assert!(saved.orders.contains_key("open"));
    }
}
