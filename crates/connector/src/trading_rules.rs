//! Periodic refresh of per-pair trading rules.

use crate::connector::{Connector, ConnectorInner};
use connector_core::{ConnectorError, Transport};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

impl<T: Transport> ConnectorInner<T> {
    /// Fetch the rules and replace the local table. Returns the number of pairs.
    pub(crate) async fn update_trading_rules(&self) -> Result<usize, ConnectorError> {
        let rules = self
            .api_call(
                &self.profile.limit_ids.trading_rules,
                "get_trading_rules",
                self.transport.get_trading_rules(),
            )
            .await?;

        let pairs: HashSet<String> = rules.iter().map(|r| r.trading_pair.clone()).collect();
        for rule in rules {
            self.trading_rules.insert(rule.trading_pair.clone(), rule);
        }
        self.trading_rules.retain(|pair, _| pairs.contains(pair));
        self.trading_rules_initialized.store(true, Ordering::Relaxed);
        Ok(pairs.len())
    }
}

pub(crate) async fn run_trading_rules_loop<T: Transport>(
    inner: Arc<ConnectorInner<T>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let result = tokio::select! {
            biased;
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
            result = inner.update_trading_rules() => result,
        };

        let pause = match result {
            Ok(count) => {
                info!(pairs = count, "Trading rules updated");
                inner.config.trading_rules_interval
            }
            Err(e) if e.is_auth() => {
                warn!(error = %e, "Trading rule refresh stopped");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Trading rule refresh failed");
                inner.config.error_pause
            }
        };

        tokio::select! {
            biased;
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

impl<T: Transport> Connector<T> {
    /// Refresh trading rules now.
    ///
    /// # Errors
    /// Returns the transport error; the previous rules stay in place.
    pub async fn update_trading_rules(&self) -> Result<usize, ConnectorError> {
        self.inner.update_trading_rules().await
    }
}
