//! User stream consumption: the push side of reconciliation.
//!
//! Subscribes to the account's private channels and feeds every record into
//! the tracker or the balance view. A dropped session is re-established after
//! a jittered exponential delay; an authentication failure stops the loop for
//! good and is surfaced through the connector status.

use crate::connector::ConnectorInner;
use common::{now_ms, ExponentialBackoff};
use connector_core::{Transport, TransportError, UserStream, UserStreamMessage};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// How a subscription session ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Closed,
    Failed(TransportError),
}

impl<T: Transport> ConnectorInner<T> {
    /// Route one decoded stream record.
    pub(crate) fn dispatch_stream_message(&self, value: &Value) {
        let message = match self.transport.classify(value) {
            Ok(message) => message,
            Err(e) => {
                self.metrics.inc_parse_errors();
                warn!(error = %e, "Dropping undecodable stream record");
                return;
            }
        };

        match message {
            UserStreamMessage::Order(update) => {
                self.apply_order_update(&update);
            }
            UserStreamMessage::Trade(trade) => {
                let outcome = self.tracker.lock().process_trade_update(&trade);
                debug!(trade_id = %trade.trade_id, ?outcome, "Stream trade");
            }
            UserStreamMessage::Balance(balance) => {
                self.balances
                    .apply_delta(&balance.asset, balance.total, balance.available);
            }
            UserStreamMessage::Control(value) => {
                debug!(record = %value, "Stream control record");
            }
            UserStreamMessage::Unknown(value) => {
                self.metrics.inc_parse_errors();
                warn!(record = %value, "Dropping stream record of unknown kind");
            }
        }
    }

    async fn consume(&self, stream: &mut UserStream, shutdown_rx: &mut watch::Receiver<bool>) -> SessionEnd {
        loop {
            let item = tokio::select! {
                biased;
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        return SessionEnd::Shutdown;
                    }
                    continue;
                }
                item = stream.recv() => item,
            };

            match item {
                None => return SessionEnd::Closed,
                Some(Err(TransportError::Parse(reason))) => {
                    self.metrics.inc_parse_errors();
                    warn!(%reason, "Undecodable stream frame");
                }
                Some(Err(e)) => return SessionEnd::Failed(e),
                Some(Ok(value)) => {
                    self.metrics.inc_stream_messages();
                    self.record_stream_message(now_ms());
                    self.dispatch_stream_message(&value);
                }
            }
        }
    }
}

/// Subscribe, consume until the session ends, back off, resubscribe.
pub(crate) async fn run_user_stream_loop<T: Transport>(
    inner: Arc<ConnectorInner<T>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let exchange = inner.transport.name().to_string();
    let channels = inner.profile.user_stream_channels.clone();
    let mut backoff = ExponentialBackoff::new(
        inner.config.user_stream_backoff_min,
        inner.config.user_stream_backoff_max,
        0.1,
    );
    info!(%exchange, ?channels, "User stream loop started");

    loop {
        let subscribed = tokio::select! {
            biased;
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
            subscribed = inner.transport.subscribe(&channels) => subscribed,
        };

        let end = match subscribed {
            Ok(mut stream) => {
                if backoff.attempt() > 0 {
                    inner.metrics.inc_resubscribe_successes();
                    info!(%exchange, "User stream resubscribed");
                }
                backoff.reset();
                inner.consume(&mut stream, &mut shutdown_rx).await
            }
            Err(e) => SessionEnd::Failed(e),
        };

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Failed(e) if e.is_auth() => {
                inner.record_auth_failure(e.to_string());
                error!(%exchange, "User stream stopped: credentials refused");
                return;
            }
            SessionEnd::Failed(e) => {
                inner.metrics.inc_network_errors();
                warn!(%exchange, error = %e, "User stream failed");
            }
            SessionEnd::Closed => warn!(%exchange, "User stream closed"),
        }

        inner.metrics.inc_resubscribe_attempts();
        let delay = backoff.next_delay();
        info!(%exchange, delay_ms = delay.as_millis() as u64, attempt = backoff.attempt(), "Resubscribing after delay");
        tokio::select! {
            biased;
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!(%exchange, "User stream loop stopped");
}
