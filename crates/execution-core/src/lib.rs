//! Core order-lifecycle types and state.
//!
//! This crate holds everything about orders and balances that does not touch
//! the network:
//!
//! - **Order model**: `OrderSide`, `OrderType`, `OrderState`, `InFlightOrder`
//! - **Status translation**: `StatusTable` maps exchange tokens to `OrderState`
//! - **Updates**: `OrderUpdate`, `OrderStateUpdate`, `TradeUpdate`
//! - **State machine**: `InFlightOrderTracker`
//! - **Balances**: `BalanceView`
//! - **Events**: `ConnectorEvent` published on an `EventBus`
//! - **Persistence**: `TrackingSnapshot`
//! - **Trading rules**: `TradingRule`
//!
//! # Order Lifecycle
//!
//! 1. The connector generates a `client_order_id` and starts tracking the order
//!    in `PendingCreate`
//! 2. The submission call is made; its response may arrive after the first
//!    stream update for the same order
//! 3. Order and trade updates arrive from the user stream and from polling, in
//!    any order and possibly twice
//! 4. The tracker applies forward-only transitions, deduplicates fills by trade
//!    id and publishes lifecycle events
//! 5. On a terminal state the order leaves the active set

mod balance;
mod event_bus;
mod events;
mod in_flight;
mod order;
mod snapshot;
mod status;
mod tracker;
mod trading_rule;
mod update;

pub use balance::{create_balance_view, Balance, BalanceView, SharedBalanceView};
pub use event_bus::{EventBus, DEFAULT_EVENT_BUS_CAPACITY};
pub use events::{
    ConnectorEvent, OrderCancelledEvent, OrderCompletedEvent, OrderCreatedEvent,
    OrderExpiredEvent, OrderFailureEvent, OrderFilledEvent,
};
pub use in_flight::{is_close, ExchangeIdAssignment, InFlightOrder, TradeApplication};
pub use order::{generate_client_order_id, OrderSide, OrderState, OrderType};
pub use snapshot::{OrderSnapshot, TrackingSnapshot};
pub use status::StatusTable;
pub use tracker::{
    InFlightOrderTracker, NotFoundOutcome, TrackerConfig, TradeOutcome, UnknownStatusError,
    UpdateOutcome, ORDER_NOT_FOUND_REASON,
};
pub use trading_rule::{RuleViolation, TradingRule};
pub use update::{OrderStateUpdate, OrderUpdate, TradeUpdate};
