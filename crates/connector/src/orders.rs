//! Order submission and cancellation.

use crate::connector::{Connector, ConnectorInner};
use common::now_ms;
use connector_core::{CancelRequest, ConnectorError, OrderRequest, Transport};
use execution_core::{
    InFlightOrder, NotFoundOutcome, OrderSide, OrderState, OrderStateUpdate, OrderType,
};
use futures_util::stream::{FuturesUnordered, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How often a cancel re-checks for a late exchange order id.
const EXCHANGE_ID_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why one order of a `cancel_all` did not cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CancelFailure {
    /// The deadline passed before the exchange answered.
    TimedOut,
    /// The cancellation failed with this error.
    Error(String),
}

/// Outcome of cancelling one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationResult {
    pub order_id: String,
    pub success: bool,
    pub failure: Option<CancelFailure>,
}

impl CancellationResult {
    fn succeeded(order_id: String) -> Self {
        Self {
            order_id,
            success: true,
            failure: None,
        }
    }

    fn failed(order_id: String, failure: CancelFailure) -> Self {
        Self {
            order_id,
            success: false,
            failure: Some(failure),
        }
    }
}

impl<T: Transport> ConnectorInner<T> {
    pub(crate) async fn create_order(
        &self,
        client_order_id: &str,
        side: OrderSide,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> Result<String, ConnectorError> {
        self.track_order(client_order_id, side, trading_pair, amount, order_type, price)?;
        self.submit_order(client_order_id).await
    }

    /// Quantize and register a new order in `PendingCreate`. Nothing is sent.
    pub(crate) fn track_order(
        &self,
        client_order_id: &str,
        side: OrderSide,
        trading_pair: &str,
        amount: Decimal,
        order_type: OrderType,
        price: Decimal,
    ) -> Result<(), ConnectorError> {
        let rule = self.trading_rule(trading_pair);
        let amount = rule.quantize_amount(amount);
        let price = if order_type.is_limit_type() {
            rule.quantize_price(price)
        } else {
            price
        };

        let order = InFlightOrder::new(
            client_order_id,
            trading_pair,
            side,
            order_type,
            price,
            amount,
            now_ms(),
        );
        if !self.tracker.lock().start_tracking_order(order) {
            warn!(%client_order_id, "Duplicate client order id, not submitting");
            return Err(ConnectorError::DuplicateOrderId(client_order_id.to_string()));
        }
        Ok(())
    }

    /// Validate a tracked order against its trading rule and send it.
    ///
    /// An order that stopped being tracked in the meantime is not sent.
    pub(crate) async fn submit_order(&self, client_order_id: &str) -> Result<String, ConnectorError> {
        let Some(order) = self.tracked_order(client_order_id) else {
            debug!(%client_order_id, "Order no longer tracked, not submitting");
            return Err(ConnectorError::OrderNotTracked(client_order_id.to_string()));
        };
        let InFlightOrder {
            trading_pair,
            side,
            order_type,
            amount,
            price,
            ..
        } = order;
        let trading_pair = trading_pair.as_str();

        let rule = self.trading_rule(trading_pair);
        if let Err(violation) = rule.validate(order_type, amount, price) {
            warn!(%client_order_id, %trading_pair, reason = %violation, "Order refused by trading rules");
            self.metrics.inc_order_rejections();
            self.fail_order(client_order_id, trading_pair, &violation.to_string());
            return Err(violation.into());
        }

        let request = OrderRequest {
            client_order_id: client_order_id.to_string(),
            trading_pair: trading_pair.to_string(),
            side,
            order_type,
            amount,
            price,
        };
        self.metrics.inc_orders_submitted();
        info!(
            %client_order_id,
            %trading_pair,
            side = %side,
            order_type = %order_type,
            %amount,
            %price,
            "Submitting order"
        );

        let placed = self
            .api_call(
                &self.profile.limit_ids.place_order,
                "place_order",
                self.transport.place_order(&request),
            )
            .await;

        match placed {
            Ok(placed) => {
                debug!(
                    %client_order_id,
                    exchange_order_id = %placed.exchange_order_id,
                    "Order acknowledged"
                );
                let update = OrderStateUpdate::for_client_id(
                    client_order_id,
                    trading_pair,
                    OrderState::Open,
                    placed.update_timestamp,
                )
                .with_exchange_order_id(placed.exchange_order_id.clone());
                self.tracker.lock().process_state_update(&update);
                Ok(placed.exchange_order_id)
            }
            Err(e) => {
                warn!(%client_order_id, %trading_pair, error = %e, "Order submission failed");
                self.metrics.inc_order_rejections();
                self.fail_order(client_order_id, trading_pair, &e.to_string());
                Err(e)
            }
        }
    }

    fn fail_order(&self, client_order_id: &str, trading_pair: &str, reason: &str) {
        let update =
            OrderStateUpdate::for_client_id(client_order_id, trading_pair, OrderState::Failed, now_ms())
                .with_reason(reason);
        self.tracker.lock().process_state_update(&update);
    }

    /// Wait for an order's exchange id, up to the configured timeout.
    async fn wait_for_exchange_order_id(&self, client_order_id: &str) -> Option<String> {
        let deadline = Instant::now() + self.config.exchange_order_id_timeout;
        loop {
            let order = self.tracked_order(client_order_id)?;
            if let Some(id) = order.exchange_order_id {
                return Some(id);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(EXCHANGE_ID_POLL_INTERVAL).await;
        }
    }

    pub(crate) async fn execute_cancel(
        &self,
        trading_pair: &str,
        client_order_id: &str,
    ) -> Result<(), ConnectorError> {
        if self.tracked_order(client_order_id).is_none() {
            debug!(%client_order_id, "Cancel requested for untracked order");
            return Err(ConnectorError::OrderNotTracked(client_order_id.to_string()));
        }

        let Some(exchange_order_id) = self.wait_for_exchange_order_id(client_order_id).await else {
            warn!(%client_order_id, "No exchange order id before timeout, cannot cancel");
            self.metrics.inc_cancel_failures();
            let outcome = self.tracker.lock().process_order_not_found(client_order_id, now_ms());
            debug!(%client_order_id, ?outcome, "Counted missing exchange order id");
            return Err(ConnectorError::MissingExchangeOrderId(client_order_id.to_string()));
        };

        let request = CancelRequest {
            client_order_id: client_order_id.to_string(),
            exchange_order_id,
            trading_pair: trading_pair.to_string(),
        };
        let result = self
            .api_call(
                &self.profile.limit_ids.cancel_order,
                "cancel_order",
                self.transport.cancel_order(&request),
            )
            .await;

        match result {
            Ok(()) => {
                if self.profile.cancel_is_synchronous {
                    let update = OrderStateUpdate::for_client_id(
                        client_order_id,
                        trading_pair,
                        OrderState::Canceled,
                        now_ms(),
                    )
                    .with_exchange_order_id(request.exchange_order_id.clone());
                    self.tracker.lock().process_state_update(&update);
                }
                debug!(%client_order_id, "Cancel accepted");
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_cancel_failures();
                if e.is_order_not_found() {
                    let outcome = self.tracker.lock().process_order_not_found(client_order_id, now_ms());
                    if outcome == NotFoundOutcome::Failed {
                        info!(%client_order_id, "Order unknown to exchange, tracking stopped");
                    }
                }
                warn!(%client_order_id, error = %e, "Cancel failed");
                Err(e)
            }
        }
    }
}

impl<T: Transport> Connector<T> {
    /// Cancel every open order, racing all cancellations against one deadline.
    ///
    /// Never fails as a whole: the result holds one entry per order that was
    /// open when the call started. Orders whose cancellation had not finished
    /// by the deadline are reported as [`CancelFailure::TimedOut`].
    pub async fn cancel_all(&self, timeout: Duration) -> Vec<CancellationResult> {
        let open: Vec<(String, String)> = self
            .inner
            .tracker
            .lock()
            .active_orders()
            .filter(|o| o.is_open())
            .map(|o| (o.client_order_id.clone(), o.trading_pair.clone()))
            .collect();

        if open.is_empty() {
            return Vec::new();
        }
        info!(count = open.len(), ?timeout, "Cancelling all open orders");

        let mut pending: FuturesUnordered<_> = open
            .iter()
            .map(|(id, pair)| {
                let inner = self.inner.clone();
                let id = id.clone();
                let pair = pair.clone();
                async move {
                    let result = inner.execute_cancel(&pair, &id).await;
                    (id, result)
                }
            })
            .collect();

        let mut finished: HashMap<String, CancellationResult> = HashMap::new();
        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((id, Ok(())))) => {
                    finished.insert(id.clone(), CancellationResult::succeeded(id));
                }
                Ok(Some((id, Err(e)))) => {
                    finished.insert(
                        id.clone(),
                        CancellationResult::failed(id, CancelFailure::Error(e.to_string())),
                    );
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = open.len() - finished.len(),
                        "Cancel-all deadline reached"
                    );
                    break;
                }
            }
        }

        open.into_iter()
            .map(|(id, _)| {
                finished
                    .remove(&id)
                    .unwrap_or_else(|| CancellationResult::failed(id, CancelFailure::TimedOut))
            })
            .collect()
    }
}
