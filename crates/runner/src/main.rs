use auth::ApiCredentials;
use common::TradingMode;
use connector::{Connector, PaperTransport};
use connector_core::{ConnectorConfig, ExchangeProfile, Transport};
use execution_core::TrackingSnapshot;
use gateway::{GatewayConfig, GatewayTransport};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Quote balance a paper account starts with.
const PAPER_QUOTE_BALANCE: i64 = 10_000;

/// Optional file the tracking state is restored from and saved to.
const STATE_FILE_VAR: &str = "CONNECTOR_STATE_FILE";

#[tokio::main]
async fn main() {
    common::init_logging();

    let trading_pairs = std::env::args().skip(1).collect::<Vec<_>>();
    let trading_pairs = if trading_pairs.is_empty() {
        vec!["BTC-USDT".to_string()]
    } else {
        trading_pairs
    };

    let config = match ConnectorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid connector configuration");
            return;
        }
    };

    let mode = TradingMode::from_env();
    info!(%mode, trading_pairs = ?trading_pairs, "Starting order connector");

    match mode {
        TradingMode::Live => {
            let gateway_config = match GatewayConfig::from_env() {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %e, "Invalid gateway configuration");
                    return;
                }
            };
            let credentials = match ApiCredentials::from_env() {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %e, "Missing gateway credentials");
                    return;
                }
            };
            let profile = ExchangeProfile::canonical(gateway_config.name.clone())
                .with_trading_pairs(trading_pairs);
            match GatewayTransport::new(gateway_config, credentials) {
                Ok(transport) => run(Connector::new(transport, profile, config)).await,
                Err(e) => error!(error = %e, "Failed to build gateway transport"),
            }
        }
        TradingMode::Paper => {
            let mut transport = PaperTransport::new();
            for pair in &trading_pairs {
                if let Some((_, quote)) = pair.split_once('-') {
                    transport = transport.with_balance(quote, Decimal::from(PAPER_QUOTE_BALANCE));
                }
            }
            let profile = ExchangeProfile::canonical("paper")
                .with_synchronous_cancel(true)
                .with_trading_pairs(trading_pairs);
            run(Connector::new(transport, profile, config)).await;
        }
    }
}

async fn run<T: Transport>(connector: Connector<T>) {
    let state_file = std::env::var(STATE_FILE_VAR).ok();
    if let Some(path) = &state_file {
        restore_state(&connector, path);
    }

    if let Err(e) = connector.start_network().await {
        error!(error = %e, "Connector failed to start");
        return;
    }

    let mut events = connector.subscribe_events();
    let mut health = tokio::time::interval(HEALTH_LOG_INTERVAL);
    let metrics = connector.metrics();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "Ctrl+C handler failed");
                }
                info!("Received Ctrl+C, initiating shutdown");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => info!(
                    event = event.name(),
                    client_order_id = %event.client_order_id(),
                    "Order event"
                ),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event receiver lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = health.tick() => {
                let snapshot = metrics.snapshot();
                info!(
                    status = %snapshot.health_status(),
                    ready = %connector.status(),
                    in_flight = connector.in_flight_orders().len(),
                    stream_messages = snapshot.stream_messages,
                    poll_cycles = snapshot.poll_cycles,
                    errors = snapshot.network_errors + snapshot.parse_errors,
                    uptime_secs = snapshot.uptime_secs as u64,
                    since_update_secs = ?snapshot.secs_since_last_update.map(|s| s as u64),
                    since_error_secs = ?snapshot.secs_since_last_error.map(|s| s as u64),
                    "Health check"
                );
            }
        }
    }

    let results = connector.cancel_all(connector.config().cancel_all_timeout).await;
    let failed = results.iter().filter(|r| !r.success).count();
    info!(cancelled = results.len() - failed, failed, "Open orders cancelled");

    if let Some(path) = &state_file {
        save_state(&connector, path);
    }
    connector.stop_network().await;

    println!("\n{}", metrics.snapshot());
    info!("Shutdown complete");
}

fn restore_state<T: Transport>(connector: &Connector<T>, path: &str) {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            info!(%path, error = %e, "No saved tracking state");
            return;
        }
    };
    match TrackingSnapshot::from_json(&json) {
        Ok(snapshot) => {
            let restored = connector.restore_tracking_states(&snapshot);
            info!(%path, restored, "Tracking state restored");
        }
        Err(e) => warn!(%path, error = %e, "Ignoring unreadable tracking state"),
    }
}

fn save_state<T: Transport>(connector: &Connector<T>, path: &str) {
    let snapshot = connector.tracking_states();
    let result = snapshot
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
    match result {
        Ok(()) => info!(%path, orders = snapshot.len(), "Tracking state saved"),
        Err(e) => error!(%path, error = %e, "Failed to save tracking state"),
    }
}
