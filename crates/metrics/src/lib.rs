//! Connector health counters.
//!
//! Counters are lock-free atomics; timestamps live behind a short
//! `parking_lot::RwLock`. One instance is owned per connector and shared with
//! its loops through [`SharedMetrics`].

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe metrics collector for one connector instance.
#[derive(Debug)]
pub struct ConnectorMetrics {
    // User stream
    stream_messages: AtomicU64,
    parse_errors: AtomicU64,
    network_errors: AtomicU64,
    resubscribe_attempts: AtomicU64,
    resubscribe_successes: AtomicU64,

    // Polling
    poll_cycles: AtomicU64,

    // Order entry
    orders_submitted: AtomicU64,
    order_rejections: AtomicU64,
    cancel_failures: AtomicU64,

    // Throttler
    throttled_acquisitions: AtomicU64,

    auth_failed: AtomicBool,

    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_exchange_update: Option<Instant>,
    last_error_time: Option<Instant>,
    last_resubscribe_time: Option<Instant>,
}

impl Default for ConnectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorMetrics {
    pub fn new() -> Self {
        Self {
            stream_messages: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            network_errors: AtomicU64::new(0),
            resubscribe_attempts: AtomicU64::new(0),
            resubscribe_successes: AtomicU64::new(0),
            poll_cycles: AtomicU64::new(0),
            orders_submitted: AtomicU64::new(0),
            order_rejections: AtomicU64::new(0),
            cancel_failures: AtomicU64::new(0),
            throttled_acquisitions: AtomicU64::new(0),
            auth_failed: AtomicBool::new(false),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_exchange_update: None,
                last_error_time: None,
                last_resubscribe_time: None,
            }),
        }
    }

    // --- Increment methods ---

    /// A user stream message arrived (counted before classification).
    pub fn inc_stream_messages(&self) {
        self.stream_messages.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_exchange_update = Some(Instant::now());
    }

    pub fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_network_errors(&self) {
        self.network_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_resubscribe_attempts(&self) {
        self.resubscribe_attempts.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_resubscribe_time = Some(Instant::now());
    }

    pub fn inc_resubscribe_successes(&self) {
        self.resubscribe_successes.fetch_add(1, Ordering::Relaxed);
    }

    /// A status polling cycle completed (with or without partial failures).
    pub fn inc_poll_cycles(&self) {
        self.poll_cycles.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_exchange_update = Some(Instant::now());
    }

    pub fn inc_orders_submitted(&self) {
        self.orders_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_order_rejections(&self) {
        self.order_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancel_failures(&self) {
        self.cancel_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// An acquisition had to wait at least one retry interval.
    pub fn inc_throttled_acquisitions(&self) {
        self.throttled_acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that the exchange rejected our credentials.
    pub fn mark_auth_failed(&self) {
        self.auth_failed.store(true, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    // --- Getter methods ---

    pub fn stream_messages(&self) -> u64 {
        self.stream_messages.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn network_errors(&self) -> u64 {
        self.network_errors.load(Ordering::Relaxed)
    }

    pub fn resubscribe_attempts(&self) -> u64 {
        self.resubscribe_attempts.load(Ordering::Relaxed)
    }

    pub fn resubscribe_successes(&self) -> u64 {
        self.resubscribe_successes.load(Ordering::Relaxed)
    }

    pub fn poll_cycles(&self) -> u64 {
        self.poll_cycles.load(Ordering::Relaxed)
    }

    pub fn orders_submitted(&self) -> u64 {
        self.orders_submitted.load(Ordering::Relaxed)
    }

    pub fn order_rejections(&self) -> u64 {
        self.order_rejections.load(Ordering::Relaxed)
    }

    pub fn cancel_failures(&self) -> u64 {
        self.cancel_failures.load(Ordering::Relaxed)
    }

    pub fn throttled_acquisitions(&self) -> u64 {
        self.throttled_acquisitions.load(Ordering::Relaxed)
    }

    pub fn auth_failed(&self) -> bool {
        self.auth_failed.load(Ordering::Relaxed)
    }

    fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    /// Seconds since either channel last delivered exchange state.
    fn secs_since_last_update(&self) -> Option<f64> {
        self.inner
            .read()
            .last_exchange_update
            .map(|t| t.elapsed().as_secs_f64())
    }

    fn secs_since_last_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_error_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Generate a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            stream_messages: self.stream_messages(),
            parse_errors: self.parse_errors(),
            network_errors: self.network_errors(),
            resubscribe_attempts: self.resubscribe_attempts(),
            resubscribe_successes: self.resubscribe_successes(),
            poll_cycles: self.poll_cycles(),
            orders_submitted: self.orders_submitted(),
            order_rejections: self.order_rejections(),
            cancel_failures: self.cancel_failures(),
            throttled_acquisitions: self.throttled_acquisitions(),
            auth_failed: self.auth_failed(),
            uptime_secs: self.uptime_secs(),
            secs_since_last_update: self.secs_since_last_update(),
            secs_since_last_error: self.secs_since_last_error(),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub stream_messages: u64,
    pub parse_errors: u64,
    pub network_errors: u64,
    pub resubscribe_attempts: u64,
    pub resubscribe_successes: u64,
    pub poll_cycles: u64,
    pub orders_submitted: u64,
    pub order_rejections: u64,
    pub cancel_failures: u64,
    pub throttled_acquisitions: u64,
    pub auth_failed: bool,
    pub uptime_secs: f64,
    pub secs_since_last_update: Option<f64>,
    pub secs_since_last_error: Option<f64>,
}

/// Health status of the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Exchange state is fresh.
    Healthy,
    /// Exchange state is stale; the polling loop should be running at its short interval.
    Degraded,
    /// No exchange state for a long time, or credentials were rejected.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl MetricsSnapshot {
    /// Seconds without exchange state before the connector counts as degraded.
    const STALE_THRESHOLD_SECS: f64 = 60.0;
    /// Seconds without exchange state before the connector counts as unhealthy.
    const UNHEALTHY_THRESHOLD_SECS: f64 = 300.0;

    /// Determine the health status based on metrics.
    pub fn health_status(&self) -> HealthStatus {
        if self.auth_failed {
            return HealthStatus::Unhealthy;
        }

        // Before the first update, fall back to uptime
        let idle = self.secs_since_last_update.unwrap_or(self.uptime_secs);

        if idle > Self::UNHEALTHY_THRESHOLD_SECS {
            HealthStatus::Unhealthy
        } else if idle > Self::STALE_THRESHOLD_SECS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Connector Metrics ===")?;
        writeln!(f, "Uptime:                 {:.1}s", self.uptime_secs)?;
        writeln!(f, "Stream messages:        {}", self.stream_messages)?;
        writeln!(f, "Poll cycles:            {}", self.poll_cycles)?;
        writeln!(f, "Orders submitted:       {}", self.orders_submitted)?;
        writeln!(f, "Order rejections:       {}", self.order_rejections)?;
        writeln!(f, "Cancel failures:        {}", self.cancel_failures)?;
        writeln!(f, "Throttled acquisitions: {}", self.throttled_acquisitions)?;
        writeln!(f, "Parse errors:           {}", self.parse_errors)?;
        writeln!(f, "Network errors:         {}", self.network_errors)?;
        writeln!(f, "Resubscribe attempts:   {}", self.resubscribe_attempts)?;
        writeln!(f, "Resubscribe successes:  {}", self.resubscribe_successes)?;
        if self.auth_failed {
            writeln!(f, "Authentication:         FAILED")?;
        }
        if let Some(secs) = self.secs_since_last_update {
            writeln!(f, "Since last update:      {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "Since last error:       {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Shared handle to metrics.
pub type SharedMetrics = Arc<ConnectorMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(ConnectorMetrics::new())
}
