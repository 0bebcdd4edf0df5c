//! Shared building blocks for the connector workspace.
//!
//! - [`backoff`]: jittered exponential delays for resubscription
//! - [`retry`]: bounded retry loop with an explicit attempt counter
//! - [`notifier`]: edge-triggered wake signal for the status polling loop
//! - [`mode`]: live / paper trading mode selection
//! - [`time`]: wall-clock helpers in milliseconds

pub mod backoff;
pub mod mode;
pub mod notifier;
pub mod retry;
pub mod time;

pub use backoff::ExponentialBackoff;
pub use mode::{ParseTradingModeError, TradingMode};
pub use notifier::{create_poll_notifier, PollNotifier, SharedPollNotifier};
pub use retry::{retry_bounded, RetryError, RetryPolicy};
pub use time::now_ms;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Uses `RUST_LOG` when set, otherwise defaults to `info`. Calling this more
/// than once is harmless; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
