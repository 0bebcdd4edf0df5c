//! One exchange account: its order and balance state and its background loops.
//!
//! [`Connector`] is a cheap handle around shared state. Order entry returns as
//! soon as the order is registered; the exchange call runs on its own task.
//! `start_network` launches four loops:
//!
//! - status polling (balances, fills, order statuses), woken by the tick driver
//! - user stream consumption, with resubscribe backoff
//! - trading rule refresh
//! - the tick driver itself
//!
//! All of them feed the same [`InFlightOrderTracker`] and [`BalanceView`].
//! Locks are held only for single synchronous mutations, never across an
//! `.await`.

use crate::clock::run_tick_driver;
use crate::polling::run_status_polling_loop;
use crate::status::ConnectorStatus;
use crate::trading_rules::run_trading_rules_loop;
use crate::user_stream::run_user_stream_loop;
use common::{
    create_poll_notifier, now_ms, retry_bounded, RetryError, RetryPolicy, SharedPollNotifier,
};
use connector_core::{ConnectorConfig, ConnectorError, ExchangeProfile, Transport, TransportError};
use dashmap::DashMap;
use execution_core::{
    create_balance_view, generate_client_order_id, Balance, ConnectorEvent, EventBus,
    InFlightOrder, InFlightOrderTracker, OrderSide, OrderType, SharedBalanceView,
    TrackingSnapshot, TradingRule,
};
use metrics::{create_metrics, SharedMetrics};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use throttler::{create_throttler, SharedThrottler};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// State shared by the connector handle and its background tasks.
pub(crate) struct ConnectorInner<T: Transport> {
    pub(crate) transport: T,
    pub(crate) profile: ExchangeProfile,
    pub(crate) config: ConnectorConfig,
    pub(crate) throttler: SharedThrottler,
    pub(crate) tracker: Mutex<InFlightOrderTracker>,
    pub(crate) balances: SharedBalanceView,
    pub(crate) event_bus: EventBus,
    pub(crate) metrics: SharedMetrics,
    pub(crate) poll_notifier: SharedPollNotifier,
    pub(crate) trading_rules: DashMap<String, TradingRule>,
    pub(crate) trading_rules_initialized: AtomicBool,
    /// Wall-clock ms of the last user stream message, 0 if none yet.
    pub(crate) last_stream_message_ms: AtomicU64,
    /// Wall-clock ms of the previous tick.
    pub(crate) last_tick_ms: AtomicU64,
    pub(crate) auth_error: Mutex<Option<String>>,
}

impl<T: Transport> ConnectorInner<T> {
    /// Run one exchange call: wait for rate limit capacity, then bound it by
    /// the request timeout.
    pub(crate) async fn api_call<R, Fut>(
        &self,
        limit_id: &str,
        operation: &'static str,
        call: Fut,
    ) -> Result<R, ConnectorError>
    where
        Fut: Future<Output = Result<R, TransportError>>,
    {
        let waited = self.throttler.acquire(limit_id).await;
        if !waited.is_zero() {
            self.metrics.inc_throttled_acquisitions();
            debug!(limit_id, waited_ms = waited.as_millis() as u64, "Request throttled");
        }

        let timeout = self.config.request_timeout;
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(ConnectorError::from),
            Err(_) => Err(ConnectorError::Timeout { operation, timeout }),
        };

        if let Err(e) = &result {
            self.note_error(operation, e);
        }
        result
    }

    fn note_error(&self, operation: &'static str, err: &ConnectorError) {
        if err.is_auth() {
            self.record_auth_failure(err.to_string());
        } else if err.is_retryable() {
            self.metrics.inc_network_errors();
            debug!(operation, error = %err, "Network error");
        }
    }

    pub(crate) fn record_auth_failure(&self, reason: String) {
        error!(exchange = %self.transport.name(), reason = %reason, "Authentication failed");
        self.metrics.mark_auth_failed();
        *self.auth_error.lock() = Some(reason);
    }

    pub(crate) fn record_stream_message(&self, timestamp_ms: u64) {
        self.last_stream_message_ms.store(timestamp_ms.max(1), Ordering::Relaxed);
    }

    /// Poll interval in force at `timestamp_ms`.
    pub(crate) fn poll_interval(&self, timestamp_ms: u64) -> Duration {
        let last = self.last_stream_message_ms.load(Ordering::Relaxed);
        let since = (last > 0).then(|| Duration::from_millis(timestamp_ms.saturating_sub(last)));
        self.config.poll_interval(since)
    }

    /// Clock tick: wake the polling loop when `floor(now / interval)` advances.
    pub(crate) fn tick(&self, timestamp_ms: u64) {
        let interval_ms = (self.poll_interval(timestamp_ms).as_millis() as u64).max(1);
        let last_tick = self.last_tick_ms.swap(timestamp_ms, Ordering::Relaxed);
        if timestamp_ms / interval_ms > last_tick / interval_ms {
            debug!(timestamp_ms, interval_ms, "Poll tick");
            self.poll_notifier.set();
        }
    }

    /// Trading rule of a pair, unrestricted if none is known.
    pub(crate) fn trading_rule(&self, trading_pair: &str) -> TradingRule {
        self.trading_rules
            .get(trading_pair)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| TradingRule::unrestricted(trading_pair))
    }

    pub(crate) fn tracked_order(&self, client_order_id: &str) -> Option<InFlightOrder> {
        self.tracker.lock().fetch_tracked_order(client_order_id).cloned()
    }
}

struct RunningTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Order entry and reconciliation for one exchange account.
pub struct Connector<T: Transport> {
    pub(crate) inner: Arc<ConnectorInner<T>>,
    tasks: Mutex<Option<RunningTasks>>,
}

impl<T: Transport> Connector<T> {
    pub fn new(transport: T, profile: ExchangeProfile, config: ConnectorConfig) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let tracker = InFlightOrderTracker::new(
            profile.status_table.clone(),
            event_bus.clone(),
            config.tracker_config(),
        );
        let throttler = create_throttler(profile.rate_limits.clone(), config.rate_limits_share_pct);

        let inner = ConnectorInner {
            transport,
            profile,
            config,
            throttler,
            tracker: Mutex::new(tracker),
            balances: create_balance_view(),
            event_bus,
            metrics: create_metrics(),
            poll_notifier: create_poll_notifier(),
            trading_rules: DashMap::new(),
            trading_rules_initialized: AtomicBool::new(false),
            last_stream_message_ms: AtomicU64::new(0),
            last_tick_ms: AtomicU64::new(0),
            auth_error: Mutex::new(None),
        };

        Self {
            inner: Arc::new(inner),
            tasks: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.transport.name()
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> SharedMetrics {
        self.inner.metrics.clone()
    }

    pub fn balances(&self) -> SharedBalanceView {
        self.inner.balances.clone()
    }

    /// Receive every lifecycle event published from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.inner.event_bus.subscribe()
    }

    // ========================================================================
    // Network lifecycle
    // ========================================================================

    /// Verify connectivity, then start the background loops.
    ///
    /// Calling this while already running does nothing.
    ///
    /// Transient connectivity failures are retried a few times, then logged;
    /// the loops start anyway and keep retrying on their own.
    ///
    /// # Errors
    /// Returns the authentication error if the exchange refuses the
    /// credentials; no loops are started in that case.
    pub async fn start_network(&self) -> Result<(), ConnectorError> {
        if self.is_running() {
            debug!(exchange = %self.name(), "Network already started");
            return Ok(());
        }

        let checked = retry_bounded(
            RetryPolicy::default(),
            "check_network",
            ConnectorError::is_retryable,
            |_| self.check_network(),
        )
        .await;
        match checked {
            Ok(()) => {}
            Err(RetryError::Fatal { error, .. }) if error.is_auth() => return Err(error),
            Err(e) => warn!(exchange = %self.name(), error = %e, "Network check failed, starting anyway"),
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = vec![
            tokio::spawn(run_tick_driver(self.inner.clone(), shutdown_rx.clone())),
            tokio::spawn(run_status_polling_loop(self.inner.clone(), shutdown_rx.clone())),
            tokio::spawn(run_user_stream_loop(self.inner.clone(), shutdown_rx.clone())),
            tokio::spawn(run_trading_rules_loop(self.inner.clone(), shutdown_rx)),
        ];

        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            // Lost a race with a concurrent start: keep the first set of loops.
            let _ = shutdown_tx.send(true);
            return Ok(());
        }
        *tasks = Some(RunningTasks {
            shutdown_tx,
            handles,
        });
        info!(exchange = %self.name(), "Network started");
        Ok(())
    }

    /// Signal every loop to stop and wait for all of them to finish.
    pub async fn stop_network(&self) {
        let running = self.tasks.lock().take();
        let Some(running) = running else {
            return;
        };

        let _ = running.shutdown_tx.send(true);
        for handle in running.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Connector task ended abnormally");
            }
        }
        info!(exchange = %self.name(), "Network stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// One authenticated round trip to the exchange.
    ///
    /// # Errors
    /// Returns the transport error, including authentication failures.
    pub async fn check_network(&self) -> Result<(), ConnectorError> {
        let inner = &self.inner;
        inner
            .api_call(
                &inner.profile.limit_ids.check_network,
                "check_network",
                inner.transport.check_network(),
            )
            .await
    }

    /// Feed one clock tick (wall-clock ms). Normally driven by the tick driver.
    pub fn tick(&self, timestamp_ms: u64) {
        self.inner.tick(timestamp_ms);
    }

    /// Poll interval that applies right now.
    pub fn current_poll_interval(&self) -> Duration {
        self.inner.poll_interval(now_ms())
    }

    // ========================================================================
    // Order entry
    // ========================================================================

    /// Place a buy order in the background. Returns the client order id.
    ///
    /// The order is already tracked when this returns; submission happens on
    /// a spawned task.
    pub fn buy(&self, trading_pair: &str, amount: Decimal, order_type: OrderType, price: Decimal) -> String {
        self.place_order(OrderSide::Buy, trading_pair, amount, order_type, price)
    }

    /// Place a sell order in the background. Returns the client order id.
    pub fn sell(&self, trading_pair: &str, amount: Decimal, order_type: OrderType, price: Decimal) -> String {
        self.place_order(OrderSide::Sell, trading_pair, amount, order_type, price)
    }

    fn place_order(
        &self,
        side: OrderSide,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> String {
        let client_order_id = self.new_client_order_id(side, trading_pair);
        // Tracked before returning so an immediate cancel finds the order.
        if let Err(e) = self
            .inner
            .track_order(&client_order_id, side, trading_pair, amount, order_type, price)
        {
            warn!(%client_order_id, error = %e, "Order not registered");
            return client_order_id;
        }

        let inner = self.inner.clone();
        let id = client_order_id.clone();
        tokio::spawn(async move {
            let _ = inner.submit_order(&id).await;
        });
        client_order_id
    }

    /// Generate a fresh client order id for this connector.
    pub fn new_client_order_id(&self, side: OrderSide, trading_pair: &str) -> String {
        generate_client_order_id(
            &self.inner.config.client_order_id_prefix,
            side,
            trading_pair,
            self.inner.config.client_order_id_max_len,
        )
    }

    /// Register and submit an order, waiting for the exchange's answer.
    ///
    /// The order is tracked before the call is made, so stream updates that
    /// beat the response are not lost.
    ///
    /// # Errors
    /// Returns the rule violation or transport error; in both cases the order
    /// has already been marked failed and `OrderFailure` published.
    pub async fn create_order(
        &self,
        client_order_id: &str,
        side: OrderSide,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> Result<String, ConnectorError> {
        self.inner
            .create_order(client_order_id, side, trading_pair, amount, order_type, price)
            .await
    }

    /// Cancel an order in the background. Returns the client order id.
    pub fn cancel(&self, trading_pair: &str, client_order_id: &str) -> String {
        let inner = self.inner.clone();
        let pair = trading_pair.to_string();
        let id = client_order_id.to_string();
        tokio::spawn(async move {
            let _ = inner.execute_cancel(&pair, &id).await;
        });
        client_order_id.to_string()
    }

    /// Cancel one order, waiting for the exchange's answer.
    ///
    /// # Errors
    /// Returns an error if the order is unknown, never received an exchange
    /// order id, or the exchange refused the cancellation.
    pub async fn execute_cancel(&self, trading_pair: &str, client_order_id: &str) -> Result<(), ConnectorError> {
        self.inner.execute_cancel(trading_pair, client_order_id).await
    }

    // ========================================================================
    // State access
    // ========================================================================

    /// Copies of every active order.
    pub fn in_flight_orders(&self) -> Vec<InFlightOrder> {
        self.inner.tracker.lock().active_orders().cloned().collect()
    }

    /// Active or recently finished order by client id.
    pub fn fetch_order(&self, client_order_id: &str) -> Option<InFlightOrder> {
        self.inner
            .tracker
            .lock()
            .fetch_order(Some(client_order_id), None)
            .cloned()
    }

    pub fn get_balance(&self, asset: &str) -> Option<Balance> {
        self.inner.balances.get(asset)
    }

    pub fn available_balance(&self, asset: &str) -> Decimal {
        self.inner.balances.available(asset).unwrap_or_default()
    }

    pub fn trading_rule(&self, trading_pair: &str) -> Option<TradingRule> {
        self.inner.trading_rules.get(trading_pair).map(|r| r.value().clone())
    }

    /// Serializable state of every unfinished order.
    pub fn tracking_states(&self) -> TrackingSnapshot {
        self.inner.tracker.lock().tracking_snapshot()
    }

    /// Re-register unfinished orders from a previous run.
    pub fn restore_tracking_states(&self, snapshot: &TrackingSnapshot) -> usize {
        self.inner.tracker.lock().restore_tracking_states(snapshot)
    }

    pub fn status(&self) -> ConnectorStatus {
        let inner = &self.inner;
        ConnectorStatus {
            account_balance: inner.balances.is_initialized(),
            trading_rule_initialized: inner.trading_rules_initialized.load(Ordering::Relaxed),
            user_stream_initialized: inner.last_stream_message_ms.load(Ordering::Relaxed) > 0,
            auth_error: inner.auth_error.lock().clone(),
        }
    }

    pub fn ready(&self) -> bool {
        self.status().is_ready()
    }
}
