//! Scripted exchange for connector integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use connector::Connector;
use connector_core::{
    CancelRequest, ConnectorConfig, ExchangeProfile, OrderRequest, PlacedOrder, Transport,
    TransportError, UserStream,
};
use execution_core::{Balance, ConnectorEvent, OrderUpdate, TradeUpdate, TradingRule};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const PAIR: &str = "BTC-USDT";

#[derive(Default)]
pub struct MockState {
    pub check_error: Option<TransportError>,
    /// Consumed one per placement; placements succeed once empty.
    pub place_errors: VecDeque<TransportError>,
    pub placed: Vec<OrderRequest>,
    /// Exchange id -> client id of accepted orders.
    pub accepted: HashMap<String, String>,
    pub cancel_errors: HashMap<String, TransportError>,
    pub cancel_delay: Option<Duration>,
    pub cancelled: Vec<String>,
    pub balances: HashMap<String, Balance>,
    pub balance_error: Option<TransportError>,
    /// Scripted status answers; accepted orders report OPEN otherwise.
    pub statuses: HashMap<String, Result<OrderUpdate, TransportError>>,
    pub fills: HashMap<String, Vec<TradeUpdate>>,
    pub rules: Vec<TradingRule>,
    pub subscribe_errors: VecDeque<TransportError>,
    pub subscriptions: usize,
    pub stream: Option<mpsc::Sender<Result<Value, TransportError>>>,
}

pub struct MockTransport {
    pub state: Mutex<MockState>,
    next_id: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Push a record on the live subscription, if any.
    pub async fn push(&self, record: Value) -> bool {
        let tx = self.state.lock().stream.clone();
        match tx {
            Some(tx) => tx.send(Ok(record)).await.is_ok(),
            None => false,
        }
    }

    /// Close the live subscription from the exchange side.
    pub fn drop_stream(&self) {
        self.state.lock().stream = None;
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn check_network(&self) -> Result<(), TransportError> {
        match self.state.lock().check_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder, TransportError> {
        let mut state = self.state.lock();
        state.placed.push(request.clone());
        if let Some(e) = state.place_errors.pop_front() {
            return Err(e);
        }
        let eid = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        state
            .accepted
            .insert(eid.clone(), request.client_order_id.clone());
        Ok(PlacedOrder {
            exchange_order_id: eid,
            update_timestamp: common::now_ms(),
        })
    }

    async fn cancel_order(&self, request: &CancelRequest) -> Result<(), TransportError> {
        let delay = self.state.lock().cancel_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if let Some(e) = state.cancel_errors.get(&request.exchange_order_id) {
            return Err(e.clone());
        }
        state.cancelled.push(request.exchange_order_id.clone());
        Ok(())
    }

    async fn get_balances(&self) -> Result<HashMap<String, Balance>, TransportError> {
        let state = self.state.lock();
        match &state.balance_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.balances.clone()),
        }
    }

    async fn get_order_status(
        &self,
        exchange_order_id: &str,
        trading_pair: &str,
    ) -> Result<OrderUpdate, TransportError> {
        let state = self.state.lock();
        if let Some(scripted) = state.statuses.get(exchange_order_id) {
            return scripted.clone();
        }
        match state.accepted.get(exchange_order_id) {
            Some(cid) => Ok(order_update(cid, exchange_order_id, trading_pair, "OPEN")),
            None => Err(TransportError::OrderNotFound(exchange_order_id.to_string())),
        }
    }

    async fn get_trade_fills(
        &self,
        exchange_order_id: &str,
        _trading_pair: &str,
    ) -> Result<Vec<TradeUpdate>, TransportError> {
        Ok(self
            .state
            .lock()
            .fills
            .get(exchange_order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_trading_rules(&self) -> Result<Vec<TradingRule>, TransportError> {
        Ok(self.state.lock().rules.clone())
    }

    async fn subscribe(&self, _channels: &[String]) -> Result<UserStream, TransportError> {
        let mut state = self.state.lock();
        state.subscriptions += 1;
        if let Some(e) = state.subscribe_errors.pop_front() {
            return Err(e);
        }
        let (tx, rx) = mpsc::channel(64);
        state.stream = Some(tx);
        Ok(rx)
    }
}

pub fn test_config() -> ConnectorConfig {
    ConnectorConfig {
        request_timeout: Duration::from_secs(2),
        error_pause: Duration::from_millis(50),
        exchange_order_id_timeout: Duration::from_millis(300),
        ..ConnectorConfig::default()
    }
}

pub fn connector(transport: MockTransport) -> Connector<MockTransport> {
    Connector::new(transport, ExchangeProfile::canonical("mock"), test_config())
}

pub fn order_update(cid: &str, eid: &str, trading_pair: &str, status: &str) -> OrderUpdate {
    OrderUpdate {
        client_order_id: Some(cid.to_string()),
        exchange_order_id: Some(eid.to_string()),
        trading_pair: trading_pair.to_string(),
        status: status.to_string(),
        update_timestamp: common::now_ms(),
        reason: None,
    }
}

pub fn trade(trade_id: &str, cid: &str, eid: &str, amount: Decimal, price: Decimal) -> TradeUpdate {
    TradeUpdate {
        trade_id: trade_id.to_string(),
        client_order_id: Some(cid.to_string()),
        exchange_order_id: Some(eid.to_string()),
        trading_pair: PAIR.to_string(),
        fill_base_amount: amount,
        fill_quote_amount: amount * price,
        fill_price: price,
        fee_asset: Some("USDT".to_string()),
        fee_amount: Decimal::ZERO,
        fill_timestamp: common::now_ms(),
    }
}

/// Names of every event already published.
pub fn drain_events(rx: &mut broadcast::Receiver<ConnectorEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    names
}

/// Re-check `condition` every 10ms until it holds, or panic after `limit`.
pub async fn wait_until<F>(limit: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let result = tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not met within {:?}", limit);
}
