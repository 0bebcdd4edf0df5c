//! In-process exchange simulation for paper trading.
//!
//! Orders fill immediately at their limit price (or the configured mark price
//! for market orders) unless immediate fills are switched off, in which case
//! they rest until [`PaperTransport::fill_order`] is called. A 0.1% fee is
//! charged in the quote asset. Every change is pushed to the subscribed user
//! stream as canonical records, so the connector reconciles paper orders
//! exactly like live ones.

use async_trait::async_trait;
use common::now_ms;
use connector_core::{CancelRequest, OrderRequest, PlacedOrder, Transport, TransportError, UserStream};
use execution_core::{Balance, OrderSide, OrderUpdate, TradeUpdate, TradingRule};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Fee rate charged on the notional of every fill (0.1%).
const FEE_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

const STREAM_BUFFER: usize = 256;

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    exchange_order_id: String,
    status: &'static str,
    /// Price the order reserves funds at and fills at.
    price: Decimal,
    fills: Vec<TradeUpdate>,
    updated_at: u64,
}

impl PaperOrder {
    fn is_open(&self) -> bool {
        self.status == "OPEN"
    }

    fn to_update(&self) -> OrderUpdate {
        OrderUpdate {
            client_order_id: Some(self.request.client_order_id.clone()),
            exchange_order_id: Some(self.exchange_order_id.clone()),
            trading_pair: self.request.trading_pair.clone(),
            status: self.status.to_string(),
            update_timestamp: self.updated_at,
            reason: None,
        }
    }

    fn base_asset(&self) -> &str {
        split_pair(&self.request.trading_pair).0
    }

    fn quote_asset(&self) -> &str {
        split_pair(&self.request.trading_pair).1
    }
}

fn split_pair(trading_pair: &str) -> (&str, &str) {
    trading_pair.split_once('-').unwrap_or((trading_pair, ""))
}

#[derive(Default)]
struct PaperState {
    balances: HashMap<String, Balance>,
    prices: HashMap<String, Decimal>,
    rules: Vec<TradingRule>,
    orders: HashMap<String, PaperOrder>,
    stream: Option<mpsc::Sender<Result<Value, TransportError>>>,
}

impl PaperState {
    fn push(&self, record: Value) {
        if let Some(tx) = &self.stream {
            if tx.try_send(Ok(record)).is_err() {
                debug!("Paper stream full or closed, dropping record");
            }
        }
    }

    fn push_balance(&self, asset: &str) {
        let balance = self.balances.get(asset).copied().unwrap_or_default();
        self.push(json!({
            "kind": "balance",
            "asset": asset,
            "total": balance.total,
            "available": balance.available,
        }));
    }

    fn push_order(&self, order: &PaperOrder) {
        let update = order.to_update();
        self.push(json!({
            "kind": "order",
            "client_order_id": update.client_order_id,
            "exchange_order_id": update.exchange_order_id,
            "trading_pair": update.trading_pair,
            "status": update.status,
            "update_timestamp": update.update_timestamp,
        }));
    }

    fn push_trade(&self, trade: &TradeUpdate) {
        self.push(json!({
            "kind": "trade",
            "trade_id": trade.trade_id,
            "client_order_id": trade.client_order_id,
            "exchange_order_id": trade.exchange_order_id,
            "trading_pair": trade.trading_pair,
            "fill_base_amount": trade.fill_base_amount,
            "fill_quote_amount": trade.fill_quote_amount,
            "fill_price": trade.fill_price,
            "fee_asset": trade.fee_asset,
            "fee_amount": trade.fee_amount,
            "fill_timestamp": trade.fill_timestamp,
        }));
    }

    fn balance_mut(&mut self, asset: &str) -> &mut Balance {
        self.balances.entry(asset.to_string()).or_default()
    }
}

/// Simulated exchange account.
pub struct PaperTransport {
    name: String,
    state: Mutex<PaperState>,
    fill_immediately: bool,
    next_order_id: AtomicU64,
    next_trade_id: AtomicU64,
}

impl Default for PaperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperTransport {
    pub fn new() -> Self {
        Self {
            name: "paper".to_string(),
            state: Mutex::new(PaperState::default()),
            fill_immediately: true,
            next_order_id: AtomicU64::new(1_000_000),
            next_trade_id: AtomicU64::new(1_000_000),
        }
    }

    /// Seed an asset's balance; everything starts available.
    pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
        self.state
            .lock()
            .balances
            .insert(asset.to_string(), Balance::new(amount, amount));
        self
    }

    /// Mark price used to fill market orders on a pair.
    pub fn with_price(self, trading_pair: &str, price: Decimal) -> Self {
        self.state.lock().prices.insert(trading_pair.to_string(), price);
        self
    }

    pub fn with_trading_rule(self, rule: TradingRule) -> Self {
        self.state.lock().rules.push(rule);
        self
    }

    /// When off, orders rest on the book until [`fill_order`](Self::fill_order).
    pub fn with_fill_immediately(mut self, fill_immediately: bool) -> Self {
        self.fill_immediately = fill_immediately;
        self
    }

    pub fn set_price(&self, trading_pair: &str, price: Decimal) {
        self.state.lock().prices.insert(trading_pair.to_string(), price);
    }

    /// Fill a resting order completely.
    ///
    /// # Errors
    /// Returns [`TransportError::OrderNotFound`] if the order is unknown or no
    /// longer open.
    pub fn fill_order(&self, exchange_order_id: &str) -> Result<TradeUpdate, TransportError> {
        let trade_id = self.next_trade_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        execute_fill(&mut state, exchange_order_id, trade_id, now_ms())
    }
}

/// Settle a full fill of an open order against the reserved funds.
fn execute_fill(
    state: &mut PaperState,
    exchange_order_id: &str,
    trade_id: u64,
    timestamp: u64,
) -> Result<TradeUpdate, TransportError> {
    let order = match state.orders.get(exchange_order_id) {
        Some(order) if order.is_open() => order.clone(),
        _ => return Err(TransportError::OrderNotFound(exchange_order_id.to_string())),
    };

    let amount = order.request.amount;
    let notional = amount * order.price;
    let fee = notional * FEE_RATE;
    let base = order.base_asset().to_string();
    let quote = order.quote_asset().to_string();

    match order.request.side {
        OrderSide::Buy => {
            let q = state.balance_mut(&quote);
            q.total -= notional + fee;
            q.available -= fee;
            let b = state.balance_mut(&base);
            b.total += amount;
            b.available += amount;
        }
        OrderSide::Sell => {
            let b = state.balance_mut(&base);
            b.total -= amount;
            let q = state.balance_mut(&quote);
            q.total += notional - fee;
            q.available += notional - fee;
        }
    }

    let trade = TradeUpdate {
        trade_id: trade_id.to_string(),
        client_order_id: Some(order.request.client_order_id.clone()),
        exchange_order_id: Some(exchange_order_id.to_string()),
        trading_pair: order.request.trading_pair.clone(),
        fill_base_amount: amount,
        fill_quote_amount: notional,
        fill_price: order.price,
        fee_asset: Some(quote.clone()),
        fee_amount: fee,
        fill_timestamp: timestamp,
    };

    let filled = {
        let stored = state
            .orders
            .get_mut(exchange_order_id)
            .ok_or_else(|| TransportError::OrderNotFound(exchange_order_id.to_string()))?;
        stored.status = "FILLED";
        stored.updated_at = timestamp;
        stored.fills.push(trade.clone());
        stored.clone()
    };

    state.push_trade(&trade);
    state.push_balance(&base);
    state.push_balance(&quote);
    state.push_order(&filled);
    debug!(%exchange_order_id, %amount, price = %order.price, "Paper order filled");
    Ok(trade)
}

#[async_trait]
impl Transport for PaperTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_network(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder, TransportError> {
        let timestamp = now_ms();
        let eid = self.next_order_id.fetch_add(1, Ordering::Relaxed).to_string();
        let mut state = self.state.lock();

        let price = if request.order_type.is_limit_type() {
            request.price
        } else {
            state
                .prices
                .get(&request.trading_pair)
                .copied()
                .ok_or_else(|| TransportError::rejected(format!("no mark price for {}", request.trading_pair)))?
        };

        let (base, quote) = split_pair(&request.trading_pair);
        let (asset, needed) = match request.side {
            OrderSide::Buy => (quote, request.amount * price * (Decimal::ONE + FEE_RATE)),
            OrderSide::Sell => (base, request.amount),
        };
        let available = state.balances.get(asset).map(|b| b.available).unwrap_or_default();
        if available < needed {
            return Err(TransportError::Rejected {
                code: Some("INSUFFICIENT_BALANCE".to_string()),
                message: format!("need {} {}, available {}", needed, asset, available),
            });
        }

        let reserve = match request.side {
            OrderSide::Buy => request.amount * price,
            OrderSide::Sell => request.amount,
        };
        let asset = asset.to_string();
        state.balance_mut(&asset).available -= reserve;

        let order = PaperOrder {
            request: request.clone(),
            exchange_order_id: eid.clone(),
            status: "OPEN",
            price,
            fills: Vec::new(),
            updated_at: timestamp,
        };
        state.push_order(&order);
        state.push_balance(&asset);
        state.orders.insert(eid.clone(), order);

        if self.fill_immediately {
            let trade_id = self.next_trade_id.fetch_add(1, Ordering::Relaxed);
            execute_fill(&mut state, &eid, trade_id, timestamp)?;
        }

        Ok(PlacedOrder {
            exchange_order_id: eid,
            update_timestamp: timestamp,
        })
    }

    async fn cancel_order(&self, request: &CancelRequest) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let order = match state.orders.get_mut(&request.exchange_order_id) {
            Some(order) if order.is_open() => {
                order.status = "CANCELED";
                order.updated_at = now_ms();
                order.clone()
            }
            _ => return Err(TransportError::OrderNotFound(request.exchange_order_id.clone())),
        };

        let (asset, reserved) = match order.request.side {
            OrderSide::Buy => (order.quote_asset().to_string(), order.request.amount * order.price),
            OrderSide::Sell => (order.base_asset().to_string(), order.request.amount),
        };
        state.balance_mut(&asset).available += reserved;
        state.push_order(&order);
        state.push_balance(&asset);
        Ok(())
    }

    async fn get_balances(&self) -> Result<HashMap<String, Balance>, TransportError> {
        Ok(self.state.lock().balances.clone())
    }

    async fn get_order_status(
        &self,
        exchange_order_id: &str,
        _trading_pair: &str,
    ) -> Result<OrderUpdate, TransportError> {
        self.state
            .lock()
            .orders
            .get(exchange_order_id)
            .map(PaperOrder::to_update)
            .ok_or_else(|| TransportError::OrderNotFound(exchange_order_id.to_string()))
    }

    async fn get_trade_fills(
        &self,
        exchange_order_id: &str,
        _trading_pair: &str,
    ) -> Result<Vec<TradeUpdate>, TransportError> {
        Ok(self
            .state
            .lock()
            .orders
            .get(exchange_order_id)
            .map(|o| o.fills.clone())
            .unwrap_or_default())
    }

    async fn get_trading_rules(&self) -> Result<Vec<TradingRule>, TransportError> {
        Ok(self.state.lock().rules.clone())
    }

    async fn subscribe(&self, _channels: &[String]) -> Result<UserStream, TransportError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        self.state.lock().stream = Some(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution_core::OrderType;
    use rust_decimal_macros::dec;

    fn request(side: OrderSide, order_type: OrderType, amount: Decimal, price: Decimal) -> OrderRequest {
        OrderRequest {
            client_order_id: "x-paper-1".to_string(),
            trading_pair: "BTC-USDT".to_string(),
            side,
            order_type,
            amount,
            price,
        }
    }

    #[tokio::test]
    async fn test_limit_buy_fills_with_fee() {
        let paper = PaperTransport::new().with_balance("USDT", dec!(100000));
        let placed = paper
            .place_order(&request(OrderSide::Buy, OrderType::Limit, dec!(1), dec!(50000)))
            .await
            .unwrap();

        let fills = paper
            .get_trade_fills(&placed.exchange_order_id, "BTC-USDT")
            .await
            .unwrap();
        assert_eq!(fills.len(), 1);
        // 0.1% of 50000
        assert_eq!(fills[0].fee_amount, dec!(50));
        assert_eq!(fills[0].fee_asset.as_deref(), Some("USDT"));

        let balances = paper.get_balances().await.unwrap();
        assert_eq!(balances["BTC"], Balance::new(dec!(1), dec!(1)));
        assert_eq!(balances["USDT"], Balance::new(dec!(49950), dec!(49950)));

        let status = paper
            .get_order_status(&placed.exchange_order_id, "BTC-USDT")
            .await
            .unwrap();
        assert_eq!(status.status, "FILLED");
    }

    #[tokio::test]
    async fn test_market_order_needs_price() {
        let paper = PaperTransport::new().with_balance("USDT", dec!(1000));
        let err = paper
            .place_order(&request(OrderSide::Buy, OrderType::Market, dec!(0.01), Decimal::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { .. }));

        paper.set_price("BTC-USDT", dec!(50000));
        let placed = paper
            .place_order(&request(OrderSide::Buy, OrderType::Market, dec!(0.01), Decimal::ZERO))
            .await
            .unwrap();
        let fills = paper
            .get_trade_fills(&placed.exchange_order_id, "BTC-USDT")
            .await
            .unwrap();
        assert_eq!(fills[0].fill_price, dec!(50000));
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected() {
        let paper = PaperTransport::new().with_balance("BTC", dec!(0.5));
        let err = paper
            .place_order(&request(OrderSide::Sell, OrderType::Limit, dec!(1), dec!(50000)))
            .await
            .unwrap_err();
        match err {
            TransportError::Rejected { code, .. } => assert_eq!(code.as_deref(), Some("INSUFFICIENT_BALANCE")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resting_order_cancel_releases_funds() {
        let paper = PaperTransport::new()
            .with_balance("BTC", dec!(2))
            .with_fill_immediately(false);
        let placed = paper
            .place_order(&request(OrderSide::Sell, OrderType::Limit, dec!(1), dec!(60000)))
            .await
            .unwrap();
        assert_eq!(paper.get_balances().await.unwrap()["BTC"].available, dec!(1));

        let cancel = CancelRequest {
            client_order_id: "x-paper-1".to_string(),
            exchange_order_id: placed.exchange_order_id.clone(),
            trading_pair: "BTC-USDT".to_string(),
        };
        paper.cancel_order(&cancel).await.unwrap();
        assert_eq!(paper.get_balances().await.unwrap()["BTC"].available, dec!(2));

        // Second cancel: no longer open.
        assert!(paper.cancel_order(&cancel).await.unwrap_err().is_order_not_found());
        assert!(paper.fill_order(&placed.exchange_order_id).is_err());
    }

    #[tokio::test]
    async fn test_stream_receives_records() {
        let paper = PaperTransport::new()
            .with_balance("USDT", dec!(1000))
            .with_fill_immediately(false);
        let mut stream = paper.subscribe(&[]).await.unwrap();

        let placed = paper
            .place_order(&request(OrderSide::Buy, OrderType::Limit, dec!(0.01), dec!(50000)))
            .await
            .unwrap();
        paper.fill_order(&placed.exchange_order_id).unwrap();

        let mut kinds = Vec::new();
        while let Ok(item) = stream.try_recv() {
            let value = item.unwrap();
            kinds.push(value["kind"].as_str().unwrap().to_string());
        }
        assert_eq!(
            kinds,
            vec!["order", "balance", "trade", "balance", "balance", "order"]
        );
    }
}
