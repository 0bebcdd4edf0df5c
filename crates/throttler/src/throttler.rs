use crate::rate_limit::{RateLimit, TaskLog};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Pause between capacity checks while a caller is waiting for admission.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Sliding-window throttler over a fixed set of rate limits.
///
/// Admission is a check-then-record step done under one short lock, so two
/// concurrent callers can never both take the last slot.
#[derive(Debug)]
pub struct AsyncThrottler {
    limits: HashMap<String, RateLimit>,
    /// limit_id -> (related limit_id, weight this call charges to it)
    related: HashMap<String, Vec<(String, u32)>>,
    share_pct: f64,
    max_window: Duration,
    retry_interval: Duration,
    task_logs: Mutex<VecDeque<TaskLog>>,
}

/// Shared handle to a throttler.
pub type SharedThrottler = Arc<AsyncThrottler>;

/// Create a shared throttler.
pub fn create_throttler(limits: Vec<RateLimit>, share_pct: f64) -> SharedThrottler {
    Arc::new(AsyncThrottler::new(limits, share_pct))
}

impl AsyncThrottler {
    /// Build a throttler.
    ///
    /// # Arguments
    /// * `limits` - Every quota the exchange enforces, including shared pools
    /// * `share_pct` - Percentage of each quota this process may use (0 to 100)
    pub fn new(limits: Vec<RateLimit>, share_pct: f64) -> Self {
        let limits: HashMap<String, RateLimit> = limits
            .into_iter()
            .map(|l| (l.limit_id.clone(), l))
            .collect();

        let related = limits
            .values()
            .map(|limit| (limit.limit_id.clone(), Self::related_of(limit, &limits)))
            .collect();

        let max_window = limits
            .values()
            .map(|l| l.window)
            .max()
            .unwrap_or(Duration::ZERO);

        Self {
            limits,
            related,
            share_pct: share_pct.clamp(0.0, 100.0),
            max_window,
            retry_interval: RETRY_INTERVAL,
            task_logs: Mutex::new(VecDeque::new()),
        }
    }

    /// Override the pause between capacity checks.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// The limit itself, every pool it links to, and every limit that links to it.
    ///
    /// Limits that link to this one are checked with zero added weight: a
    /// call on a shared pool does not consume their capacity.
    fn related_of(limit: &RateLimit, all: &HashMap<String, RateLimit>) -> Vec<(String, u32)> {
        let mut related = vec![(limit.limit_id.clone(), limit.weight)];

        for linked in &limit.linked_limits {
            if all.contains_key(&linked.limit_id) {
                related.push((linked.limit_id.clone(), linked.weight));
            } else {
                debug!(
                    limit_id = %limit.limit_id,
                    linked = %linked.limit_id,
                    "Linked limit is not configured, ignoring"
                );
            }
        }

        for other in all.values() {
            if other.limit_id != limit.limit_id
                && other.links_to(&limit.limit_id)
                && !related.iter().any(|(id, _)| id == &other.limit_id)
            {
                related.push((other.limit_id.clone(), 0));
            }
        }

        related
    }

    /// Configured limit by id.
    pub fn limit(&self, limit_id: &str) -> Option<&RateLimit> {
        self.limits.get(limit_id)
    }

    pub fn share_pct(&self) -> f64 {
        self.share_pct
    }

    /// Number of entries currently held in the ledger.
    pub fn task_log_len(&self) -> usize {
        self.task_logs.lock().len()
    }

    /// Drop ledger entries older than the widest configured window.
    pub fn flush(&self) {
        let now = Instant::now();
        Self::flush_locked(&mut self.task_logs.lock(), now, self.max_window);
    }

    fn flush_locked(logs: &mut VecDeque<TaskLog>, now: Instant, max_window: Duration) {
        // Entries are appended in time order, so the oldest sit at the front.
        while logs
            .front()
            .map_or(false, |t| now.duration_since(t.timestamp) >= max_window)
        {
            logs.pop_front();
        }
    }

    /// Weight charged to `limit_id` within its own trailing window.
    fn used_capacity(logs: &VecDeque<TaskLog>, limit: &RateLimit, now: Instant) -> u32 {
        logs.iter()
            .filter(|t| now.duration_since(t.timestamp) < limit.window)
            .map(|t| t.weight_for(&limit.limit_id))
            .sum()
    }

    fn within_capacity_locked(&self, logs: &VecDeque<TaskLog>, limit_id: &str, now: Instant) -> bool {
        let Some(related) = self.related.get(limit_id) else {
            return true;
        };

        related.iter().all(|(id, added)| match self.limits.get(id) {
            Some(limit) => {
                let used = Self::used_capacity(logs, limit, now);
                used + added <= limit.effective_capacity(self.share_pct)
            }
            None => true,
        })
    }

    /// Whether one more call on `limit_id` fits into every related limit right now.
    ///
    /// Flushes expired entries first. Unknown limit ids are always within capacity.
    pub fn within_capacity(&self, limit_id: &str) -> bool {
        let now = Instant::now();
        let mut logs = self.task_logs.lock();
        Self::flush_locked(&mut logs, now, self.max_window);
        self.within_capacity_locked(&logs, limit_id, now)
    }

    /// Admit without waiting if there is room, recording the call.
    pub fn try_acquire(&self, limit_id: &str) -> bool {
        let Some(related) = self.related.get(limit_id) else {
            debug!(limit_id, "No rate limit configured, admitting");
            return true;
        };

        let now = Instant::now();
        let mut logs = self.task_logs.lock();
        Self::flush_locked(&mut logs, now, self.max_window);

        if !self.within_capacity_locked(&logs, limit_id, now) {
            return false;
        }

        logs.push_back(TaskLog {
            timestamp: now,
            consumed: related
                .iter()
                .filter(|(_, weight)| *weight > 0)
                .cloned()
                .collect(),
        });
        true
    }

    /// Wait until a call on `limit_id` is admitted, then record it.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self, limit_id: &str) -> Duration {
        let started = Instant::now();
        let mut polls = 0u32;

        while !self.try_acquire(limit_id) {
            polls += 1;
            if polls == 1 {
                trace!(limit_id, "Rate limit reached, waiting for capacity");
            }
            tokio::time::sleep(self.retry_interval).await;
        }

        if polls == 0 {
            Duration::ZERO
        } else {
            started.elapsed()
        }
    }
}
