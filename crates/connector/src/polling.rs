//! Status polling: the pull side of reconciliation.
//!
//! Each cycle fetches balances, trade fills and order statuses concurrently,
//! then applies them in a fixed order: balances, trades, statuses. Applying
//! trades first means a status of FILLED never overtakes the fills that
//! produced it within one cycle. A failed request is logged and left for the
//! next cycle; it never aborts the others.

use crate::connector::{Connector, ConnectorInner};
use common::now_ms;
use connector_core::Transport;
use execution_core::{NotFoundOutcome, OrderUpdate, TradeOutcome, TradeUpdate};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What one polling cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Balances replaced from a fresh fetch.
    pub balances_updated: bool,
    /// Assets evicted by the balance replacement.
    pub evicted_assets: Vec<String>,
    /// Fills that changed an order.
    pub trades_applied: usize,
    /// Status records applied (whether or not they changed anything).
    pub statuses_applied: usize,
    /// Orders counted as not found.
    pub not_found: usize,
    /// Requests that failed.
    pub failures: usize,
}

struct PollTarget {
    client_order_id: String,
    exchange_order_id: String,
    trading_pair: String,
    active: bool,
}

impl<T: Transport> ConnectorInner<T> {
    /// Run one full reconciliation pass.
    pub(crate) async fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();
        let now = now_ms();
        let id_timeout_ms = self.config.exchange_order_id_timeout.as_millis() as u64;

        // Orders still waiting for an exchange id are skipped; once they have
        // waited too long they count as lost.
        let (targets, missing_id): (Vec<PollTarget>, Vec<String>) = {
            let tracker = self.tracker.lock();
            let mut targets = Vec::new();
            let mut missing = Vec::new();
            for order in tracker.all_fillable_orders() {
                let is_active = tracker.is_tracking(&order.client_order_id);
                match &order.exchange_order_id {
                    Some(eid) => targets.push(PollTarget {
                        client_order_id: order.client_order_id.clone(),
                        exchange_order_id: eid.clone(),
                        trading_pair: order.trading_pair.clone(),
                        active: is_active,
                    }),
                    None if is_active && now.saturating_sub(order.creation_timestamp) > id_timeout_ms => {
                        missing.push(order.client_order_id.clone())
                    }
                    None => {}
                }
            }
            (targets, missing)
        };

        let ids = &self.profile.limit_ids;
        let balances_fut = self.api_call(&ids.balances, "get_balances", self.transport.get_balances());
        let fills_fut = join_all(targets.iter().map(|t| {
            self.api_call(
                &ids.trade_fills,
                "get_trade_fills",
                self.transport.get_trade_fills(&t.exchange_order_id, &t.trading_pair),
            )
        }));
        let statuses_fut = join_all(targets.iter().filter(|t| t.active).map(|t| async move {
            let result = self
                .api_call(
                    &ids.order_status,
                    "get_order_status",
                    self.transport.get_order_status(&t.exchange_order_id, &t.trading_pair),
                )
                .await;
            (t, result)
        }));

        let (balances, fills, statuses) = tokio::join!(balances_fut, fills_fut, statuses_fut);

        // 1. balances
        match balances {
            Ok(balances) => {
                report.evicted_assets = self.balances.replace_from_fetch(balances);
                report.balances_updated = true;
                if !report.evicted_assets.is_empty() {
                    debug!(evicted = ?report.evicted_assets, "Evicted stale balances");
                }
            }
            Err(e) => {
                report.failures += 1;
                warn!(error = %e, "Balance fetch failed");
            }
        }

        // 2. trades
        for (target, result) in targets.iter().zip(fills) {
            match result {
                Ok(trades) => report.trades_applied += self.apply_trades(&trades),
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        client_order_id = %target.client_order_id,
                        error = %e,
                        "Trade fill fetch failed"
                    );
                }
            }
        }

        // 3. statuses
        for (target, result) in statuses {
            match result {
                Ok(update) => {
                    if self.apply_order_update(&update) {
                        report.statuses_applied += 1;
                    }
                }
                Err(e) if e.is_order_not_found() => {
                    report.not_found += 1;
                    self.count_not_found(&target.client_order_id);
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        client_order_id = %target.client_order_id,
                        error = %e,
                        "Order status fetch failed"
                    );
                }
            }
        }

        for client_order_id in &missing_id {
            report.not_found += 1;
            self.count_not_found(client_order_id);
        }

        self.metrics.inc_poll_cycles();
        report
    }

    fn apply_trades(&self, trades: &[TradeUpdate]) -> usize {
        let mut tracker = self.tracker.lock();
        trades
            .iter()
            .filter(|trade| {
                matches!(
                    tracker.process_trade_update(trade),
                    TradeOutcome::Applied { .. } | TradeOutcome::LateFill
                )
            })
            .count()
    }

    /// Apply one status record. Returns false if the token was not understood.
    pub(crate) fn apply_order_update(&self, update: &OrderUpdate) -> bool {
        let result = self.tracker.lock().process_order_update(update);
        match result {
            Ok(_) => true,
            Err(e) => {
                self.metrics.inc_parse_errors();
                warn!(error = %e, "Discarding order update");
                false
            }
        }
    }

    fn count_not_found(&self, client_order_id: &str) {
        let outcome = self
            .tracker
            .lock()
            .process_order_not_found(client_order_id, now_ms());
        if outcome == NotFoundOutcome::Failed {
            info!(%client_order_id, "Order lost on exchange, marked failed");
        }
    }
}

/// Wait for the poll signal, run a cycle, reset the signal, repeat.
pub(crate) async fn run_status_polling_loop<T: Transport>(
    inner: Arc<ConnectorInner<T>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(exchange = %inner.transport.name(), "Status polling loop started");
    loop {
        tokio::select! {
            biased;
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
            _ = inner.poll_notifier.wait() => {}
        }

        let report = tokio::select! {
            biased;
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
            report = inner.poll_once() => report,
        };
        inner.poll_notifier.reset();
        debug!(?report, "Polling cycle complete");

        if report.failures > 0 {
            tokio::select! {
                biased;
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(inner.config.error_pause) => {}
            }
        }
    }
    info!("Status polling loop stopped");
}

impl<T: Transport> Connector<T> {
    /// Run one reconciliation pass now, outside the tick schedule.
    pub async fn poll_once(&self) -> PollReport {
        self.inner.poll_once().await
    }
}

