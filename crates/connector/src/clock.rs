//! Wall-clock tick driver for the polling schedule.

use crate::connector::ConnectorInner;
use common::now_ms;
use connector_core::Transport;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

pub(crate) async fn run_tick_driver<T: Transport>(
    inner: Arc<ConnectorInner<T>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(inner.config.tick_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => inner.tick(now_ms()),
        }
    }
}
